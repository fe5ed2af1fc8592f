//! Assistant: one outstanding AI request per session, with stub fallback.
//!
//! Hosts with blocking collaborators call [`Assistant::send`]. Async hosts
//! split it: [`Assistant::begin`] returns the request to ship, and
//! [`Assistant::complete`] takes whatever came back (or the failure).

use crate::apply::{ApplyReport, OpApplier};
use crate::collab::{AiRequest, AiResponse, CollabError, Collaborator};
use crate::explain::{self, EMPTY_EXPLANATION, Note};
use crate::hit::Selection;
use crate::stub::StubCollaborator;
use chrono::{DateTime, Utc};
use mg_core::id::CanvasId;
use mg_core::session::{Role, Session};
use mg_core::store::AnchorTarget;
use rand::Rng;
use rand::rngs::StdRng;
use serde::Serialize;

/// Reply shown when neither the collaborator nor the stub could answer.
pub const FAILURE_REPLY: &str = "The request failed, please try again later.";

/// Who produced the reply of an exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplySource {
    Collaborator,
    Stub,
    Failure,
}

/// Result of a completed exchange.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Exchange {
    pub reply: String,
    pub source: ReplySource,
    pub report: ApplyReport,
    /// Note pinned by an explain request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<Note>,
}

#[derive(Debug, Clone)]
struct Pending {
    request: AiRequest,
    /// Explain target and the canvas it was on when the request began.
    explain: Option<(CanvasId, AnchorTarget)>,
}

#[derive(Debug, Clone)]
pub struct Assistant<R = StdRng> {
    applier: OpApplier<R>,
    stub: StubCollaborator,
    pending: Option<Pending>,
}

impl Assistant<StdRng> {
    pub fn seeded(seed: u64) -> Self {
        Self::new(OpApplier::seeded(seed))
    }
}

impl<R: Rng> Assistant<R> {
    pub fn new(applier: OpApplier<R>) -> Self {
        Self {
            applier,
            stub: StubCollaborator,
            pending: None,
        }
    }

    pub fn is_busy(&self) -> bool {
        self.pending.is_some()
    }

    /// Drop the outstanding request, if any.
    pub fn cancel(&mut self) {
        self.pending = None;
    }

    /// Record the user message and build the request for it.
    pub fn begin(
        &mut self,
        session: &mut Session,
        selection: &Selection,
        message: &str,
        now: DateTime<Utc>,
    ) -> Result<AiRequest, CollabError> {
        self.start(session, selection, message, None, now)
    }

    /// Build an explain request for a node or edge of the active canvas.
    pub fn begin_explain(
        &mut self,
        session: &mut Session,
        target: AnchorTarget,
        now: DateTime<Utc>,
    ) -> Result<AiRequest, CollabError> {
        let prompt = explain::explain_prompt(session.store.active(), target);
        let selection = explain::explain_selection(target);
        self.start(session, &selection, &prompt, Some(target), now)
    }

    fn start(
        &mut self,
        session: &mut Session,
        selection: &Selection,
        message: &str,
        explain: Option<AnchorTarget>,
        now: DateTime<Utc>,
    ) -> Result<AiRequest, CollabError> {
        if self.pending.is_some() {
            return Err(CollabError::Busy);
        }
        session.push_message(Role::User, message, now);
        let request = AiRequest::build(session, selection, message);
        self.pending = Some(Pending {
            request: request.clone(),
            explain: explain.map(|target| (session.store.active_id(), target)),
        });
        Ok(request)
    }

    /// Finish the outstanding request with the collaborator's `outcome`.
    /// A failed outcome falls back to the stub; if that fails too, the
    /// reply is a generic failure message and nothing is applied.
    pub fn complete(
        &mut self,
        session: &mut Session,
        outcome: Result<AiResponse, CollabError>,
        now: DateTime<Utc>,
    ) -> Result<Exchange, CollabError> {
        let Pending { request, explain } = self.pending.take().ok_or(CollabError::Idle)?;

        let (response, source) = match outcome {
            Ok(response) => (response, ReplySource::Collaborator),
            Err(err) => {
                log::warn!("collaborator failed ({err}), using local stub");
                match self.stub.respond(&request) {
                    Ok(response) => (response, ReplySource::Stub),
                    Err(err) => {
                        log::warn!("stub failed too: {err}");
                        (AiResponse::reply(FAILURE_REPLY), ReplySource::Failure)
                    }
                }
            }
        };

        let report = self.applier.apply_at(&mut session.store, &response.ops, now);
        let mut reply = response.reply;
        if reply.is_empty() && explain.is_some() {
            reply = EMPTY_EXPLANATION.to_string();
        }

        let note = explain.and_then(|(canvas_id, target)| {
            let Some(canvas) = session.store.canvas_mut(canvas_id) else {
                log::warn!("canvas {canvas_id} is gone, explanation of {target} not pinned");
                return None;
            };
            explain::attach_note(canvas, target, &reply, self.applier.placement(), now)
        });

        if !reply.is_empty() {
            session.push_message(Role::Assistant, reply.clone(), now);
        }
        Ok(Exchange {
            reply,
            source,
            report,
            note,
        })
    }

    /// Round trip through a blocking collaborator.
    pub fn send(
        &mut self,
        session: &mut Session,
        selection: &Selection,
        message: &str,
        collaborator: &mut dyn Collaborator,
        now: DateTime<Utc>,
    ) -> Result<Exchange, CollabError> {
        let request = self.begin(session, selection, message, now)?;
        let outcome = collaborator.respond(&request);
        self.complete(session, outcome, now)
    }

    /// Explain round trip through a blocking collaborator.
    pub fn explain(
        &mut self,
        session: &mut Session,
        target: AnchorTarget,
        collaborator: &mut dyn Collaborator,
        now: DateTime<Utc>,
    ) -> Result<Exchange, CollabError> {
        let request = self.begin_explain(session, target, now)?;
        let outcome = collaborator.respond(&request);
        self.complete(session, outcome, now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mg_core::id::NodeId;
    use mg_core::model::Node;

    fn session() -> Session {
        let mut s = Session::new("Demo");
        s.store
            .active_mut()
            .insert_node(Node::new(NodeId::intern("n1"), 200.0, 180.0, "Computer"));
        s
    }

    fn failing(_: &AiRequest) -> Result<AiResponse, CollabError> {
        Err(CollabError::Failed("offline".into()))
    }

    #[test]
    fn second_request_while_busy_is_refused() {
        let mut assistant = Assistant::seeded(1);
        let mut s = session();
        assistant.begin(&mut s, &Selection::default(), "hi", Utc::now()).unwrap();
        assert!(matches!(
            assistant.begin(&mut s, &Selection::default(), "again", Utc::now()),
            Err(CollabError::Busy)
        ));
        assistant.cancel();
        assert!(!assistant.is_busy());
    }

    #[test]
    fn complete_without_begin_is_an_error() {
        let mut assistant = Assistant::seeded(1);
        let mut s = session();
        assert!(matches!(
            assistant.complete(&mut s, Ok(AiResponse::default()), Utc::now()),
            Err(CollabError::Idle)
        ));
    }

    #[test]
    fn failure_falls_back_to_stub() {
        let mut assistant = Assistant::seeded(1);
        let mut s = session();
        let exchange = assistant
            .send(&mut s, &Selection::default(), "What is a computer?", &mut failing, Utc::now())
            .unwrap();
        assert_eq!(exchange.source, ReplySource::Stub);
        assert!(!exchange.report.added_nodes.is_empty());
        assert!(!assistant.is_busy());
        // user + assistant turns
        assert_eq!(s.transcript.len(), 2);
    }

    #[test]
    fn collaborator_ops_are_applied() {
        let mut assistant = Assistant::seeded(1);
        let mut s = session();
        let mut remote = |_: &AiRequest| {
            AiResponse::from_json(
                r#"{"reply":"done","ops":[{"type":"update_node","id":"n1","summary":"A machine"}]}"#,
            )
        };
        let exchange = assistant
            .send(&mut s, &Selection::default(), "describe", &mut remote, Utc::now())
            .unwrap();
        assert_eq!(exchange.source, ReplySource::Collaborator);
        assert_eq!(exchange.reply, "done");
        let n1 = s.store.active().node(NodeId::intern("n1")).unwrap();
        assert_eq!(n1.summary.as_deref(), Some("A machine"));
        assert_eq!(n1.label, "Computer");
    }

    #[test]
    fn explain_pins_a_note() {
        let mut assistant = Assistant::seeded(1);
        let mut s = session();
        let mut remote = |req: &AiRequest| -> Result<AiResponse, CollabError> {
            assert_eq!(req.selection.nodes, vec![NodeId::intern("n1")]);
            assert!(req.message.contains("\"Computer\""));
            Ok(AiResponse::reply("A computer processes information."))
        };
        let exchange = assistant
            .explain(&mut s, AnchorTarget::Node(NodeId::intern("n1")), &mut remote, Utc::now())
            .unwrap();
        let note = exchange.note.unwrap();
        assert_eq!(
            s.store.active().node(note.node).unwrap().label,
            "A computer processes information."
        );
    }

    #[test]
    fn note_lands_on_the_explained_canvas_after_a_switch() {
        let mut assistant = Assistant::seeded(1);
        let mut s = session();
        let root = s.store.active_id();
        assistant
            .begin_explain(&mut s, AnchorTarget::Node(NodeId::intern("n1")), Utc::now())
            .unwrap();
        let response = AiResponse::from_json(
            r#"{"reply":"A computer computes.","ops":[{"type":"create_child_canvas","nodeId":"n1"}]}"#,
        );
        let exchange = assistant.complete(&mut s, response, Utc::now()).unwrap();

        assert_ne!(s.store.active_id(), root);
        assert!(s.store.active().nodes.is_empty());
        let note = exchange.note.unwrap();
        let main = s.store.canvas(root).unwrap();
        assert_eq!(main.nodes.len(), 2);
        assert_eq!(main.node(note.node).unwrap().label, "A computer computes.");
    }

    #[test]
    fn note_ignores_host_navigation_while_pending() {
        let mut assistant = Assistant::seeded(1);
        let mut s = session();
        let root = s.store.active_id();
        let child = s
            .store
            .create_child_canvas(AnchorTarget::Node(NodeId::intern("n1")), None, "detail")
            .unwrap();
        assistant
            .begin_explain(&mut s, AnchorTarget::Node(NodeId::intern("n1")), Utc::now())
            .unwrap();
        s.store.switch_to(child).unwrap();
        let exchange = assistant
            .complete(&mut s, Ok(AiResponse::reply("It computes.")), Utc::now())
            .unwrap();

        assert!(exchange.note.is_some());
        assert!(s.store.canvas(child).unwrap().nodes.is_empty());
        assert_eq!(s.store.canvas(root).unwrap().nodes.len(), 2);
    }

    #[test]
    fn empty_explanation_gets_placeholder() {
        let mut assistant = Assistant::seeded(1);
        let mut s = session();
        let mut remote = |_: &AiRequest| -> Result<AiResponse, CollabError> { Ok(AiResponse::default()) };
        let exchange = assistant
            .explain(&mut s, AnchorTarget::Node(NodeId::intern("n1")), &mut remote, Utc::now())
            .unwrap();
        assert_eq!(exchange.reply, EMPTY_EXPLANATION);
    }
}
