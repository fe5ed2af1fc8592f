//! Persistent snapshots of sessions and of the whole registry.
//!
//! Snapshots are plain serde records, encoded as JSON or as MessagePack
//! (named fields). The hierarchy is flattened to a canvas list where every
//! child canvas names its parent and anchor; restoring re-validates it and
//! rebuilds the breadcrumb from the active canvas.

use crate::id::{CanvasId, EdgeId, NodeId};
use crate::model::{Canvas, Edge, Node};
use crate::session::{ChatMessage, Session, SessionId, SessionRegistry};
use crate::store::{Anchor, AnchorTarget, CanvasStore, Crumb};
use chrono::{DateTime, Utc};
use petgraph::algo::is_cyclic_directed;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("snapshot has no root canvas")]
    MissingRoot,
    #[error("root canvas cannot be anchored")]
    AnchoredRoot,
    #[error("canvas `{0}` appears more than once")]
    DuplicateCanvas(CanvasId),
    #[error("canvas `{0}` has no anchor")]
    Unanchored(CanvasId),
    #[error("canvas `{canvas}` is anchored in unknown canvas `{parent}`")]
    UnknownParent { canvas: CanvasId, parent: CanvasId },
    #[error("{target} of `{parent}` anchors more than one canvas")]
    DuplicateAnchor { parent: CanvasId, target: AnchorTarget },
    #[error("node `{node}` appears more than once on canvas `{canvas}`")]
    DuplicateNode { canvas: CanvasId, node: NodeId },
    #[error("edge `{edge}` appears more than once on canvas `{canvas}`")]
    DuplicateEdge { canvas: CanvasId, edge: EdgeId },
    #[error("canvas hierarchy contains a cycle")]
    Cycle,
    #[error("registry snapshot has no sessions")]
    NoSessions,
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("msgpack encode: {0}")]
    Encode(#[from] rmp_serde::encode::Error),
    #[error("msgpack decode: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
}

// ─── Records ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnchorRecord {
    pub parent: CanvasId,
    pub target: AnchorTarget,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanvasRecord {
    pub id: CanvasId,
    pub title: String,
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anchor: Option<AnchorRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub id: SessionId,
    pub title: String,
    pub created_at: DateTime<Utc>,
    /// Root first, then depth-first.
    pub canvases: Vec<CanvasRecord>,
    /// Informational; recomputed from `active` on restore.
    #[serde(default)]
    pub stack: Vec<Crumb>,
    pub active: CanvasId,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transcript: Vec<ChatMessage>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    pub sessions: Vec<SessionSnapshot>,
    pub active: SessionId,
}

// ─── Session ─────────────────────────────────────────────────────────────

impl SessionSnapshot {
    pub fn capture(session: &Session) -> Self {
        let store = &session.store;
        let canvases = store
            .outline()
            .into_iter()
            .filter_map(|entry| {
                let canvas = store.canvas(entry.id)?;
                let anchor = store.anchor_of(entry.id).map(|a| AnchorRecord {
                    parent: a.canvas,
                    target: a.target,
                });
                Some(CanvasRecord {
                    id: canvas.id,
                    title: canvas.title.clone(),
                    nodes: canvas.nodes.clone(),
                    edges: canvas.edges.clone(),
                    anchor,
                })
            })
            .collect();

        Self {
            id: session.id.clone(),
            title: session.title.clone(),
            created_at: session.created_at,
            canvases,
            stack: store.stack().to_vec(),
            active: store.active_id(),
            transcript: session.transcript.clone(),
        }
    }

    /// Rebuild a session, validating the canvas hierarchy.
    pub fn restore(self) -> Result<Session, SnapshotError> {
        let store = build_store(self.canvases, self.active)?;
        let mut session = Session::with_id(self.id, self.title, self.created_at);
        session.store = store;
        session.transcript = self.transcript;
        Ok(session)
    }

    pub fn to_json(&self) -> Result<String, SnapshotError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(s: &str) -> Result<Self, SnapshotError> {
        Ok(serde_json::from_str(s)?)
    }

    pub fn to_msgpack(&self) -> Result<Vec<u8>, SnapshotError> {
        to_msgpack(self)
    }

    pub fn from_msgpack(bytes: &[u8]) -> Result<Self, SnapshotError> {
        from_msgpack(bytes)
    }
}

impl CanvasRecord {
    fn into_canvas(self) -> Result<Canvas, SnapshotError> {
        let canvas = self.id;
        let mut nodes = HashSet::new();
        if let Some(n) = self.nodes.iter().find(|n| !nodes.insert(n.id)) {
            return Err(SnapshotError::DuplicateNode { canvas, node: n.id });
        }
        let mut edges = HashSet::new();
        if let Some(e) = self.edges.iter().find(|e| !edges.insert(e.id)) {
            return Err(SnapshotError::DuplicateEdge { canvas, edge: e.id });
        }
        Ok(Canvas {
            id: self.id,
            title: self.title,
            nodes: self.nodes,
            edges: self.edges,
        })
    }
}

fn build_store(records: Vec<CanvasRecord>, active: CanvasId) -> Result<CanvasStore, SnapshotError> {
    let mut root = None;
    let mut children = Vec::new();
    for record in records {
        if record.id.is_root() {
            if record.anchor.is_some() {
                return Err(SnapshotError::AnchoredRoot);
            }
            if root.is_some() {
                return Err(SnapshotError::DuplicateCanvas(record.id));
            }
            root = Some(record);
        } else {
            children.push(record);
        }
    }
    let root = root.ok_or(SnapshotError::MissingRoot)?;

    let mut store = CanvasStore::with_root(root.into_canvas()?);

    // Register every canvas first so parents may appear after children.
    let mut pending = Vec::with_capacity(children.len());
    for record in children {
        if store.contains(record.id) {
            return Err(SnapshotError::DuplicateCanvas(record.id));
        }
        let id = record.id;
        let anchor = record.anchor.clone().ok_or(SnapshotError::Unanchored(id))?;
        let canvas = record.into_canvas()?;
        store.register(id);
        store.canvases.insert(id, canvas);
        pending.push((id, anchor));
    }

    let mut anchors = HashMap::new();
    for (id, record) in pending {
        let parent_idx = *store
            .tree_index
            .get(&record.parent)
            .ok_or(SnapshotError::UnknownParent {
                canvas: id,
                parent: record.parent,
            })?;
        let anchor = Anchor {
            canvas: record.parent,
            target: record.target,
        };
        if anchors.insert(anchor, id).is_some() {
            return Err(SnapshotError::DuplicateAnchor {
                parent: record.parent,
                target: record.target,
            });
        }
        store.tree.add_edge(parent_idx, store.tree_index[&id], record.target);
    }
    if is_cyclic_directed(&store.tree) {
        return Err(SnapshotError::Cycle);
    }
    store.anchors = anchors;

    let active = if store.contains(active) {
        active
    } else {
        log::warn!("snapshot active canvas {active} is missing, using root");
        CanvasId::root()
    };
    store
        .switch_to(active)
        .map_err(|_| SnapshotError::MissingRoot)?;
    Ok(store)
}

// ─── Registry ────────────────────────────────────────────────────────────

impl RegistrySnapshot {
    pub fn capture(registry: &SessionRegistry) -> Self {
        Self {
            sessions: registry.iter().map(SessionSnapshot::capture).collect(),
            active: registry.active_id().clone(),
        }
    }

    pub fn restore(self) -> Result<SessionRegistry, SnapshotError> {
        let sessions = self
            .sessions
            .into_iter()
            .map(SessionSnapshot::restore)
            .collect::<Result<Vec<_>, _>>()?;
        SessionRegistry::from_parts(sessions, self.active).ok_or(SnapshotError::NoSessions)
    }

    pub fn to_json(&self) -> Result<String, SnapshotError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(s: &str) -> Result<Self, SnapshotError> {
        Ok(serde_json::from_str(s)?)
    }

    pub fn to_msgpack(&self) -> Result<Vec<u8>, SnapshotError> {
        to_msgpack(self)
    }

    pub fn from_msgpack(bytes: &[u8]) -> Result<Self, SnapshotError> {
        from_msgpack(bytes)
    }
}

fn to_msgpack<T: Serialize>(value: &T) -> Result<Vec<u8>, SnapshotError> {
    Ok(rmp_serde::to_vec_named(value)?)
}

fn from_msgpack<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, SnapshotError> {
    Ok(rmp_serde::from_slice(bytes)?)
}
