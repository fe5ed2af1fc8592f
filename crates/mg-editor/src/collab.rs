//! AI exchange wire types and the collaborator seam.

use crate::hit::Selection;
use crate::ops::Operation;
use mg_core::id::{CanvasId, EdgeId, NodeId};
use mg_core::model::Canvas;
use mg_core::session::{Session, SessionId};
use mg_core::store::Crumb;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum CollabError {
    #[error("a request is already in flight")]
    Busy,
    #[error("no request in flight")]
    Idle,
    #[error("collaborator failed: {0}")]
    Failed(String),
    #[error("invalid response: {0}")]
    Json(#[from] serde_json::Error),
    #[error("response is not a JSON object")]
    NotAnObject,
}

// ─── Request ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeView {
    pub id: NodeId,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeView {
    pub id: EdgeId,
    pub source: NodeId,
    pub target: NodeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

/// The active canvas as the collaborator sees it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphView {
    pub nodes: Vec<NodeView>,
    pub edges: Vec<EdgeView>,
}

impl GraphView {
    pub fn of(canvas: &Canvas) -> Self {
        Self {
            nodes: canvas
                .nodes
                .iter()
                .map(|n| NodeView {
                    id: n.id,
                    label: n.label.clone(),
                    name: n.name.clone(),
                    summary: n.summary.clone(),
                    x: n.x,
                    y: n.y,
                    w: n.width,
                    h: n.height,
                })
                .collect(),
            edges: canvas
                .edges
                .iter()
                .map(|e| EdgeView {
                    id: e.id,
                    source: e.source,
                    target: e.target,
                    name: e.name.clone(),
                    summary: e.summary.clone(),
                })
                .collect(),
        }
    }

    pub fn node(&self, id: NodeId) -> Option<&NodeView> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Distinct neighbours of `id`.
    pub fn neighbors(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        for e in &self.edges {
            let other = match (e.source == id, e.target == id) {
                (true, _) => e.target,
                (_, true) => e.source,
                _ => continue,
            };
            if !out.contains(&other) {
                out.push(other);
            }
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiRequest {
    pub session_id: SessionId,
    pub active_canvas_id: CanvasId,
    pub canvas_stack: Vec<Crumb>,
    pub selection: Selection,
    pub graph: GraphView,
    pub message: String,
}

impl AiRequest {
    pub fn build(session: &Session, selection: &Selection, message: impl Into<String>) -> Self {
        let store = &session.store;
        Self {
            session_id: session.id.clone(),
            active_canvas_id: store.active_id(),
            canvas_stack: store.stack().to_vec(),
            selection: selection.clone(),
            graph: GraphView::of(store.active()),
            message: message.into(),
        }
    }

    /// First selected node, if any.
    pub fn focus(&self) -> Option<NodeId> {
        self.selection.nodes.first().copied()
    }
}

// ─── Response ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AiResponse {
    #[serde(default)]
    pub reply: String,
    #[serde(default)]
    pub ops: Vec<Operation>,
}

impl AiResponse {
    pub fn reply(text: impl Into<String>) -> Self {
        Self {
            reply: text.into(),
            ops: Vec::new(),
        }
    }

    /// Lenient decoding: `reply` and `ops` may be absent, and operations that
    /// fail to decode are dropped one by one.
    pub fn from_json(s: &str) -> Result<Self, CollabError> {
        Self::from_value(serde_json::from_str(s)?)
    }

    pub fn from_value(value: Value) -> Result<Self, CollabError> {
        let Value::Object(mut obj) = value else {
            return Err(CollabError::NotAnObject);
        };
        let reply = match obj.remove("reply") {
            Some(Value::String(s)) => s,
            _ => String::new(),
        };
        let ops = match obj.remove("ops") {
            Some(Value::Array(items)) => items
                .into_iter()
                .enumerate()
                .filter_map(|(i, item)| match serde_json::from_value::<Operation>(item) {
                    Ok(op) => Some(op),
                    Err(err) => {
                        log::warn!("dropping malformed op #{i}: {err}");
                        None
                    }
                })
                .collect(),
            _ => Vec::new(),
        };
        Ok(Self { reply, ops })
    }
}

/// Anything able to answer an [`AiRequest`]: a remote service client, or
/// the local stub.
pub trait Collaborator {
    fn respond(&mut self, request: &AiRequest) -> Result<AiResponse, CollabError>;
}

impl<F> Collaborator for F
where
    F: FnMut(&AiRequest) -> Result<AiResponse, CollabError>,
{
    fn respond(&mut self, request: &AiRequest) -> Result<AiResponse, CollabError> {
        self(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mg_core::model::{Edge, Node};
    use pretty_assertions::assert_eq;

    #[test]
    fn request_wire_format() {
        let mut session = Session::with_id("s1".into(), "Demo", chrono::Utc::now());
        let canvas = session.store.active_mut();
        canvas.insert_node(Node::new(NodeId::intern("n1"), 200.0, 180.0, "Computer"));
        canvas.insert_edge(Edge::new(EdgeId::intern("e1"), NodeId::intern("n1"), NodeId::intern("n2")));

        let req = AiRequest::build(&session, &Selection::node(NodeId::intern("n1")), "expand");
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["sessionId"], "s1");
        assert_eq!(json["activeCanvasId"], "main");
        assert_eq!(json["canvasStack"][0]["id"], "main");
        assert_eq!(json["selection"]["nodes"][0], "n1");
        assert_eq!(json["graph"]["nodes"][0]["w"], 160.0);
        assert_eq!(json["graph"]["edges"][0]["target"], "n2");
        assert_eq!(json["message"], "expand");
    }

    #[test]
    fn response_tolerates_missing_fields() {
        assert_eq!(AiResponse::from_json("{}").unwrap(), AiResponse::default());
        let r = AiResponse::from_json(r#"{"reply":"hi"}"#).unwrap();
        assert_eq!(r.reply, "hi");
        assert!(r.ops.is_empty());
    }

    #[test]
    fn response_drops_bad_ops_individually() {
        let r = AiResponse::from_json(
            r#"{"reply":"ok","ops":[
                {"type":"delete_nodes","ids":["a"]},
                {"type":"teleport"},
                {"type":"update_node"},
                {"type":"delete_edges","ids":["e"]}
            ]}"#,
        )
        .unwrap();
        assert_eq!(r.ops.len(), 2);
        assert_eq!(r.ops[1].kind(), "delete_edges");
    }

    #[test]
    fn non_object_response_is_an_error() {
        assert!(matches!(AiResponse::from_json("[1,2]"), Err(CollabError::NotAnObject)));
        assert!(matches!(AiResponse::from_json("nope"), Err(CollabError::Json(_))));
    }

    #[test]
    fn graph_view_neighbors_are_distinct() {
        let mut c = Canvas::new(mg_core::id::CanvasId::root(), "Main canvas");
        let (a, b) = (NodeId::intern("a"), NodeId::intern("b"));
        c.insert_edge(Edge::new(EdgeId::intern("x"), a, b));
        c.insert_edge(Edge::new(EdgeId::intern("y"), b, a));
        assert_eq!(GraphView::of(&c).neighbors(a), vec![b]);
    }
}
