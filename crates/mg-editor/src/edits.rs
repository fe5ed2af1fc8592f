//! Renderer write-backs: edits produced by direct manipulation of the
//! active canvas.

use chrono::{DateTime, Utc};
use mg_core::id::{EdgeId, NodeId};
use mg_core::store::CanvasStore;
use serde::{Deserialize, Serialize};

/// An edit from canvas interaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum Edit {
    /// Drag finished: new top-left corner. Logs the position and locks the
    /// node against automatic layout.
    MoveNode {
        id: NodeId,
        x: f64,
        y: f64,
        #[serde(default = "Utc::now")]
        at: DateTime<Utc>,
    },
    /// User resize; clamped to the minimum node size.
    ResizeNode { id: NodeId, width: f64, height: f64 },
    /// Label measured by the renderer; never below the default box.
    MeasuredSize { id: NodeId, width: f64, height: f64 },
    RenameEdge { id: EdgeId, name: String },
}

impl Edit {
    pub fn move_node(id: NodeId, x: f64, y: f64) -> Self {
        Self::MoveNode {
            id,
            x,
            y,
            at: Utc::now(),
        }
    }
}

/// Apply an edit to the active canvas. Returns `false` when the target is
/// not on it.
pub fn apply_edit(store: &mut CanvasStore, edit: Edit) -> bool {
    let canvas = store.active_mut();
    match edit {
        Edit::MoveNode { id, x, y, at } => match canvas.node_mut(id) {
            Some(node) => {
                node.move_by_user(x, y, at);
                log::debug!("moved {id} to ({x}, {y})");
                true
            }
            None => false,
        },
        Edit::ResizeNode { id, width, height } => canvas
            .node_mut(id)
            .map(|node| node.resize(width, height))
            .is_some(),
        Edit::MeasuredSize { id, width, height } => canvas
            .node_mut(id)
            .map(|node| node.apply_measured_size(width, height))
            .is_some(),
        Edit::RenameEdge { id, name } => canvas
            .edge_mut(id)
            .map(|edge| edge.name = Some(name))
            .is_some(),
    }
}
