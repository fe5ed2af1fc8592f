//! Mutation protocol: the typed operations an AI collaborator issues.
//!
//! Wire format is JSON objects tagged by `"type"` with camelCase fields:
//!
//! ```json
//! {"type": "add_nodes", "attachTo": "n1", "nodes": [{"id": "mem", "label": "Memory"}]}
//! {"type": "create_child_canvas", "nodeId": "n1", "canvasId": "c-n1", "title": "CPU"}
//! ```

use mg_core::id::{CanvasId, EdgeId, NodeId};
use mg_core::store::AnchorTarget;
use serde::{Deserialize, Serialize};

/// A node to be added. Missing position means "let the placement engine
/// decide"; missing id means "generate one".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeDraft {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<NodeId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub important: bool,
}

impl NodeDraft {
    pub fn new(id: &str, label: impl Into<String>) -> Self {
        Self {
            id: Some(NodeId::intern(id)),
            label: Some(label.into()),
            ..Self::default()
        }
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    pub fn at(mut self, x: f64, y: f64) -> Self {
        self.x = Some(x);
        self.y = Some(y);
        self
    }

    /// Label, else name, else id.
    pub fn display_label(&self) -> Option<&str> {
        [self.label.as_deref(), self.name.as_deref()]
            .into_iter()
            .flatten()
            .find(|s| !s.is_empty())
            .or_else(|| self.id.as_ref().map(NodeId::as_str))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeDraft {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<EdgeId>,
    pub source: NodeId,
    pub target: NodeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

impl EdgeDraft {
    pub fn new(id: &str, source: NodeId, target: NodeId) -> Self {
        Self {
            id: Some(EdgeId::intern(id)),
            source,
            target,
            name: None,
            summary: None,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// One graph mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum Operation {
    AddNodes {
        #[serde(default)]
        nodes: Vec<NodeDraft>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        attach_to: Option<NodeId>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target_canvas: Option<CanvasId>,
    },
    AddEdges {
        #[serde(default)]
        edges: Vec<EdgeDraft>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target_canvas: Option<CanvasId>,
    },
    DeleteNodes {
        #[serde(default)]
        ids: Vec<NodeId>,
    },
    DeleteEdges {
        #[serde(default)]
        ids: Vec<EdgeId>,
    },
    UpdateNode {
        id: NodeId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        label: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        summary: Option<String>,
    },
    UpdateEdge {
        id: EdgeId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        summary: Option<String>,
    },
    CreateChildCanvas {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        node_id: Option<NodeId>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        edge_id: Option<EdgeId>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        canvas_id: Option<CanvasId>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
    },
}

impl Operation {
    /// Wire name of the operation.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AddNodes { .. } => "add_nodes",
            Self::AddEdges { .. } => "add_edges",
            Self::DeleteNodes { .. } => "delete_nodes",
            Self::DeleteEdges { .. } => "delete_edges",
            Self::UpdateNode { .. } => "update_node",
            Self::UpdateEdge { .. } => "update_edge",
            Self::CreateChildCanvas { .. } => "create_child_canvas",
        }
    }

    pub fn create_child_canvas(target: AnchorTarget, canvas_id: Option<CanvasId>, title: impl Into<String>) -> Self {
        let (node_id, edge_id) = match target {
            AnchorTarget::Node(id) => (Some(id), None),
            AnchorTarget::Edge(id) => (None, Some(id)),
        };
        Self::CreateChildCanvas {
            node_id,
            edge_id,
            canvas_id,
            title: Some(title.into()),
        }
    }
}
