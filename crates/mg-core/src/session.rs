//! Sessions: one independent canvas hierarchy per conversation.

use crate::store::CanvasStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub const DEFAULT_SESSION_TITLE: &str = "New session";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// A fresh random (v4) id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

// ─── Transcript ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

/// One chat turn kept with the session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    #[serde(rename = "ts")]
    pub at: DateTime<Utc>,
}

// ─── Session ─────────────────────────────────────────────────────────────

/// A conversation and the diagram grown in it.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: SessionId,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub store: CanvasStore,
    pub transcript: Vec<ChatMessage>,
}

impl Session {
    pub fn new(title: impl Into<String>) -> Self {
        Self::with_id(SessionId::generate(), title, Utc::now())
    }

    pub fn with_id(id: SessionId, title: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            title: title.into(),
            created_at,
            store: CanvasStore::new(),
            transcript: Vec::new(),
        }
    }

    pub fn push_message(&mut self, role: Role, content: impl Into<String>, at: DateTime<Utc>) {
        self.transcript.push(ChatMessage {
            role,
            content: content.into(),
            at,
        });
    }
}

// ─── Registry ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("unknown session `{0}`")]
    UnknownSession(SessionId),
}

/// Ordered set of sessions with one active entry. Never empty.
#[derive(Debug, Clone)]
pub struct SessionRegistry {
    sessions: Vec<Session>,
    active: SessionId,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRegistry {
    /// A registry holding one empty default session.
    pub fn new() -> Self {
        Self::from_session(Session::new(DEFAULT_SESSION_TITLE))
    }

    pub fn from_session(session: Session) -> Self {
        let active = session.id.clone();
        Self {
            sessions: vec![session],
            active,
        }
    }

    /// Rebuild from parts. Returns `None` when `sessions` is empty; an
    /// unknown `active` falls back to the first session.
    pub fn from_parts(sessions: Vec<Session>, active: SessionId) -> Option<Self> {
        let first = sessions.first()?.id.clone();
        let active = if sessions.iter().any(|s| s.id == active) {
            active
        } else {
            first
        };
        Some(Self { sessions, active })
    }

    /// Create a session and make it active.
    pub fn create(&mut self, title: impl Into<String>) -> &mut Session {
        let session = Session::new(title);
        log::debug!("created session {}", session.id);
        self.insert(session)
    }

    /// Add a prebuilt session and make it active. A session with the same id
    /// is replaced in place.
    pub fn insert(&mut self, session: Session) -> &mut Session {
        self.active = session.id.clone();
        let pos = match self.position(&session.id) {
            Some(pos) => {
                self.sessions[pos] = session;
                pos
            }
            None => {
                self.sessions.push(session);
                self.sessions.len() - 1
            }
        };
        &mut self.sessions[pos]
    }

    pub fn switch(&mut self, id: &SessionId) -> Result<&mut Session, SessionError> {
        let pos = self
            .position(id)
            .ok_or_else(|| SessionError::UnknownSession(id.clone()))?;
        self.active = id.clone();
        log::debug!("switched to session {id}");
        Ok(&mut self.sessions[pos])
    }

    pub fn active_id(&self) -> &SessionId {
        &self.active
    }

    pub fn active(&self) -> &Session {
        let pos = self.active_position();
        &self.sessions[pos]
    }

    pub fn active_mut(&mut self) -> &mut Session {
        let pos = self.active_position();
        &mut self.sessions[pos]
    }

    pub fn get(&self, id: &SessionId) -> Option<&Session> {
        self.sessions.iter().find(|s| &s.id == id)
    }

    pub fn get_mut(&mut self, id: &SessionId) -> Option<&mut Session> {
        self.sessions.iter_mut().find(|s| &s.id == id)
    }

    pub fn rename(&mut self, id: &SessionId, title: impl Into<String>) -> Result<(), SessionError> {
        let session = self
            .get_mut(id)
            .ok_or_else(|| SessionError::UnknownSession(id.clone()))?;
        session.title = title.into();
        Ok(())
    }

    /// Remove a session. Removing the active one activates its neighbour;
    /// removing the last one leaves a fresh default session behind.
    pub fn remove(&mut self, id: &SessionId) -> Result<Session, SessionError> {
        let pos = self
            .position(id)
            .ok_or_else(|| SessionError::UnknownSession(id.clone()))?;
        let removed = self.sessions.remove(pos);
        if self.sessions.is_empty() {
            self.sessions.push(Session::new(DEFAULT_SESSION_TITLE));
        }
        if self.active == removed.id {
            let next = pos.min(self.sessions.len() - 1);
            self.active = self.sessions[next].id.clone();
        }
        log::debug!("removed session {}", removed.id);
        Ok(removed)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Session> {
        self.sessions.iter()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn position(&self, id: &SessionId) -> Option<usize> {
        self.sessions.iter().position(|s| &s.id == id)
    }

    fn active_position(&self) -> usize {
        self.position(&self.active).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::NodeId;
    use crate::model::Node;

    #[test]
    fn registry_starts_with_one_session() {
        let reg = SessionRegistry::new();
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.active().title, DEFAULT_SESSION_TITLE);
    }

    #[test]
    fn create_makes_new_session_active() {
        let mut reg = SessionRegistry::new();
        let id = reg.create("Networking").id.clone();
        assert_eq!(reg.active_id(), &id);
        assert_eq!(reg.len(), 2);
    }

    #[test]
    fn sessions_are_isolated() {
        let mut reg = SessionRegistry::new();
        let first = reg.active_id().clone();
        reg.active_mut()
            .store
            .active_mut()
            .insert_node(Node::new(NodeId::intern("n1"), 0.0, 0.0, "A"));

        let second = reg.create("Other").id.clone();
        assert!(reg.active().store.active().nodes.is_empty());

        reg.switch(&first).unwrap();
        assert_eq!(reg.active().store.active().nodes.len(), 1);
        assert!(reg.get(&second).unwrap().store.active().nodes.is_empty());
    }

    #[test]
    fn switch_to_unknown_session_fails() {
        let mut reg = SessionRegistry::new();
        let ghost = SessionId::new("ghost");
        assert_eq!(
            reg.switch(&ghost).unwrap_err(),
            SessionError::UnknownSession(ghost)
        );
    }

    #[test]
    fn rename_session() {
        let mut reg = SessionRegistry::new();
        let id = reg.active_id().clone();
        reg.rename(&id, "Operating systems").unwrap();
        assert_eq!(reg.active().title, "Operating systems");
    }

    #[test]
    fn removing_active_session_activates_neighbour() {
        let mut reg = SessionRegistry::new();
        let first = reg.active_id().clone();
        let second = reg.create("B").id.clone();
        reg.remove(&second).unwrap();
        assert_eq!(reg.active_id(), &first);
    }

    #[test]
    fn removing_last_session_leaves_a_default() {
        let mut reg = SessionRegistry::new();
        let only = reg.active_id().clone();
        reg.remove(&only).unwrap();
        assert_eq!(reg.len(), 1);
        assert_ne!(reg.active_id(), &only);
    }

    #[test]
    fn session_id_is_a_uuid() {
        let id = SessionId::generate();
        assert!(Uuid::parse_str(id.as_str()).is_ok());
        assert_eq!(serde_json::to_string(&SessionId::new("s1")).unwrap(), "\"s1\"");
    }
}
