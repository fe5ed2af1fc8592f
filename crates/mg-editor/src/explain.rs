//! Explain requests: ask about one node or edge, then pin the answer to
//! the canvas as a note node.

use crate::hit::Selection;
use chrono::{DateTime, Utc};
use kurbo::{Point, Size};
use mg_core::id::{EdgeId, NodeId};
use mg_core::model::{Canvas, DEFAULT_NODE_HEIGHT, DEFAULT_NODE_WIDTH, Edge, Node};
use mg_core::placement::{PlacementConfig, place};
use mg_core::store::AnchorTarget;
use serde::Serialize;

/// Longest note label, in characters.
pub const NOTE_LABEL_LIMIT: usize = 180;
/// Gap between an explained node and its note.
const NOTE_OFFSET_X: f64 = 30.0;

pub const EMPTY_EXPLANATION: &str = "No explanation available yet.";

/// Prompt asking the collaborator to explain `target`.
pub fn explain_prompt(canvas: &Canvas, target: AnchorTarget) -> String {
    match target {
        AnchorTarget::Node(id) => {
            let Some(node) = canvas.node(id) else {
                return "Explain the selected node.".to_string();
            };
            let relations: Vec<String> = canvas
                .edges
                .iter()
                .filter(|e| e.touches(id))
                .map(|e| {
                    let other = if e.source == id { e.target } else { e.source };
                    let other = canvas.node(other).map_or(other.as_str(), |n| n.title());
                    format!("{}: {other}", e.name.as_deref().unwrap_or("relation"))
                })
                .collect();
            format!(
                "Explain the node \"{}\" in light of its relations:\n{}\nKeep it to concise key points.",
                node.title(),
                relations.join("\n")
            )
        }
        AnchorTarget::Edge(id) => {
            let Some(edge) = canvas.edge(id) else {
                return "Explain the selected connection.".to_string();
            };
            let end = |n: NodeId| canvas.node(n).map_or(n.as_str(), |n| n.title()).to_string();
            format!(
                "Explain the relation \"{}\" from {} to {}: its meaning and constraints.",
                edge.name.as_deref().unwrap_or("relation"),
                end(edge.source),
                end(edge.target)
            )
        }
    }
}

pub fn explain_selection(target: AnchorTarget) -> Selection {
    match target {
        AnchorTarget::Node(id) => Selection::node(id),
        AnchorTarget::Edge(id) => Selection::edge(id),
    }
}

/// Ids of a pinned note and its connecting edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Note {
    pub node: NodeId,
    pub edge: EdgeId,
}

/// Pin `reply` next to `target`: right of a node, or at the middle of an
/// edge's segment. Returns `None` when the target (or an edge endpoint) is
/// not on `canvas`.
pub fn attach_note(
    canvas: &mut Canvas,
    target: AnchorTarget,
    reply: &str,
    placement: &PlacementConfig,
    now: DateTime<Utc>,
) -> Option<Note> {
    let (desired, source, name, edge_name) = match target {
        AnchorTarget::Node(id) => {
            let n = canvas.node(id)?;
            (Point::new(n.x + n.width + NOTE_OFFSET_X, n.y), id, "Explanation", "explains")
        }
        AnchorTarget::Edge(id) => {
            let e = canvas.edge(id)?;
            let line = canvas.edge_segment(e)?;
            (line.p0.midpoint(line.p1), e.source, "Relation note", "note")
        }
    };

    let size = Size::new(DEFAULT_NODE_WIDTH, DEFAULT_NODE_HEIGHT);
    let placed = place(&canvas.rects(), desired, size, placement);

    let node_id = note_id(canvas, now);
    let label: String = reply.chars().take(NOTE_LABEL_LIMIT).collect();
    let mut node = Node::new(node_id, placed.position.x, placed.position.y, label);
    node.name = Some(name.to_string());
    node.record_position(now);
    canvas.insert_node(node);

    let edge_id = EdgeId::intern(&format!("e-{node_id}"));
    let mut edge = Edge::new(edge_id, source, node_id);
    edge.name = Some(edge_name.to_string());
    canvas.insert_edge(edge);

    log::debug!("pinned note {node_id} to {target}");
    Some(Note {
        node: node_id,
        edge: edge_id,
    })
}

/// `note-<millis>`, re-drawn with a counter suffix on collision.
fn note_id(canvas: &Canvas, now: DateTime<Utc>) -> NodeId {
    let id = NodeId::intern(&format!("note-{}", now.timestamp_millis()));
    if !canvas.contains_node(id) {
        return id;
    }
    loop {
        let id = NodeId::with_prefix(&format!("note-{}", now.timestamp_millis()));
        if !canvas.contains_node(id) {
            return id;
        }
    }
}
