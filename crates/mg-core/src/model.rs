//! Node, edge and canvas records.
//!
//! A canvas is one page of the diagram: an ordered list of nodes and an
//! ordered list of edges. Insertion order is z-order for renderers and
//! carries no other meaning. Records are plain data so that renderers can
//! write measured sizes and drag positions straight into them.

use crate::geometry::{bounds_of, node_rect};
use crate::id::{CanvasId, EdgeId, NodeId};
use chrono::{DateTime, Utc};
use kurbo::{Line, Point, Rect};
use serde::{Deserialize, Serialize};

pub const DEFAULT_NODE_WIDTH: f64 = 160.0;
pub const DEFAULT_NODE_HEIGHT: f64 = 40.0;
/// Smallest size a user resize may produce.
pub const MIN_NODE_WIDTH: f64 = 80.0;
pub const MIN_NODE_HEIGHT: f64 = 28.0;

fn default_width() -> f64 {
    DEFAULT_NODE_WIDTH
}

fn default_height() -> f64 {
    DEFAULT_NODE_HEIGHT
}

fn is_false(b: &bool) -> bool {
    !*b
}

// ─── Node ────────────────────────────────────────────────────────────────

/// One entry of a node's position history.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionSnapshot {
    pub x: f64,
    pub y: f64,
    #[serde(rename = "ts")]
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    /// Top-left corner.
    pub x: f64,
    pub y: f64,
    #[serde(rename = "w", default = "default_width")]
    pub width: f64,
    #[serde(rename = "h", default = "default_height")]
    pub height: f64,
    /// Display label; may embed markdown and math markup.
    #[serde(default)]
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub important: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub history: Vec<PositionSnapshot>,
    /// Set once the user repositions the node by hand.
    #[serde(default, skip_serializing_if = "is_false")]
    pub locked: bool,
}

impl Node {
    pub fn new(id: NodeId, x: f64, y: f64, label: impl Into<String>) -> Self {
        Self {
            id,
            x,
            y,
            width: DEFAULT_NODE_WIDTH,
            height: DEFAULT_NODE_HEIGHT,
            label: label.into(),
            name: None,
            summary: None,
            important: false,
            history: Vec::new(),
            locked: false,
        }
    }

    pub fn rect(&self) -> Rect {
        node_rect(self.x, self.y, self.width, self.height)
    }

    pub fn center(&self) -> Point {
        self.rect().center()
    }

    /// Label, else name, else id.
    pub fn title(&self) -> &str {
        if !self.label.is_empty() {
            &self.label
        } else {
            self.name.as_deref().unwrap_or(self.id.as_str())
        }
    }

    /// Record the current position in the history log.
    pub fn record_position(&mut self, at: DateTime<Utc>) {
        self.history.push(PositionSnapshot {
            x: self.x,
            y: self.y,
            at,
        });
    }

    /// Commit a user drag: move, log the position and lock the node.
    pub fn move_by_user(&mut self, x: f64, y: f64, at: DateTime<Utc>) {
        self.x = x;
        self.y = y;
        self.record_position(at);
        self.locked = true;
    }

    /// User resize, clamped to the minimum node size.
    pub fn resize(&mut self, width: f64, height: f64) {
        self.width = width.max(MIN_NODE_WIDTH);
        self.height = height.max(MIN_NODE_HEIGHT);
    }

    /// Size reported by the renderer after measuring the label.
    /// Never shrinks below the default box.
    pub fn apply_measured_size(&mut self, width: f64, height: f64) {
        self.width = width.max(DEFAULT_NODE_WIDTH);
        self.height = height.max(DEFAULT_NODE_HEIGHT);
    }
}

// ─── Edge ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub id: EdgeId,
    pub source: NodeId,
    pub target: NodeId,
    /// Relation name shown at the midpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

impl Edge {
    pub fn new(id: EdgeId, source: NodeId, target: NodeId) -> Self {
        Self {
            id,
            source,
            target,
            name: None,
            summary: None,
        }
    }

    pub fn touches(&self, node: NodeId) -> bool {
        self.source == node || self.target == node
    }
}

// ─── Canvas ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Canvas {
    pub id: CanvasId,
    pub title: String,
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

impl Canvas {
    pub fn new(id: CanvasId, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            nodes: Vec::new(),
            edges: Vec::new(),
        }
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.iter_mut().find(|n| n.id == id)
    }

    pub fn edge(&self, id: EdgeId) -> Option<&Edge> {
        self.edges.iter().find(|e| e.id == id)
    }

    pub fn edge_mut(&mut self, id: EdgeId) -> Option<&mut Edge> {
        self.edges.iter_mut().find(|e| e.id == id)
    }

    pub fn contains_node(&self, id: NodeId) -> bool {
        self.node(id).is_some()
    }

    pub fn contains_edge(&self, id: EdgeId) -> bool {
        self.edge(id).is_some()
    }

    /// Append a node. Returns `false` (and drops it) if the id is taken.
    pub fn insert_node(&mut self, node: Node) -> bool {
        if self.contains_node(node.id) {
            return false;
        }
        self.nodes.push(node);
        true
    }

    /// Append an edge. Returns `false` (and drops it) if the id is taken.
    /// Endpoints are not checked.
    pub fn insert_edge(&mut self, edge: Edge) -> bool {
        if self.contains_edge(edge.id) {
            return false;
        }
        self.edges.push(edge);
        true
    }

    /// Remove nodes by id together with the edges touching them.
    /// Returns the number of nodes removed.
    pub fn remove_nodes(&mut self, ids: &[NodeId]) -> usize {
        let before = self.nodes.len();
        self.nodes.retain(|n| !ids.contains(&n.id));
        self.edges.retain(|e| !ids.iter().any(|id| e.touches(*id)));
        before - self.nodes.len()
    }

    /// Remove edges by id. Returns the number removed.
    pub fn remove_edges(&mut self, ids: &[EdgeId]) -> usize {
        let before = self.edges.len();
        self.edges.retain(|e| !ids.contains(&e.id));
        before - self.edges.len()
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.edges.clear();
    }

    /// Rectangles of every node, in z-order.
    pub fn rects(&self) -> Vec<Rect> {
        self.nodes.iter().map(Node::rect).collect()
    }

    /// Union bounds of all nodes.
    pub fn bounds(&self) -> Option<Rect> {
        bounds_of(self.nodes.iter().map(Node::rect))
    }

    /// Ids of nodes sharing an edge with `id`, without duplicates.
    pub fn neighbors(&self, id: NodeId) -> Vec<NodeId> {
        let mut out: Vec<NodeId> = Vec::new();
        for e in &self.edges {
            let other = if e.source == id {
                e.target
            } else if e.target == id {
                e.source
            } else {
                continue;
            };
            if !out.contains(&other) {
                out.push(other);
            }
        }
        out
    }

    /// Drawn segment of an edge: right-middle of the source to left-middle
    /// of the target. `None` when either endpoint is missing.
    pub fn edge_segment(&self, edge: &Edge) -> Option<Line> {
        let s = self.node(edge.source)?;
        let t = self.node(edge.target)?;
        Some(Line::new(
            Point::new(s.x + s.width, s.y + s.height / 2.0),
            Point::new(t.x, t.y + t.height / 2.0),
        ))
    }

    /// Edges with both endpoints present, paired with their segment.
    /// Dangling edges are skipped.
    pub fn resolved_edges(&self) -> impl Iterator<Item = (&Edge, Line)> {
        self.edges
            .iter()
            .filter_map(|e| self.edge_segment(e).map(|line| (e, line)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn canvas_with(ids: &[&str]) -> Canvas {
        let mut c = Canvas::new(CanvasId::root(), "Main");
        for (i, id) in ids.iter().enumerate() {
            c.insert_node(Node::new(NodeId::intern(id), 200.0 * i as f64, 0.0, *id));
        }
        c
    }

    #[test]
    fn duplicate_node_ids_are_rejected() {
        let mut c = canvas_with(&["a"]);
        assert!(!c.insert_node(Node::new(NodeId::intern("a"), 5.0, 5.0, "dup")));
        assert_eq!(c.nodes.len(), 1);
        assert_eq!(c.nodes[0].label, "a");
    }

    #[test]
    fn removing_nodes_drops_incident_edges() {
        let mut c = canvas_with(&["a", "b", "c"]);
        c.insert_edge(Edge::new(EdgeId::intern("ab"), NodeId::intern("a"), NodeId::intern("b")));
        c.insert_edge(Edge::new(EdgeId::intern("bc"), NodeId::intern("b"), NodeId::intern("c")));
        assert_eq!(c.remove_nodes(&[NodeId::intern("a")]), 1);
        assert_eq!(c.edges.len(), 1);
        assert_eq!(c.edges[0].id, EdgeId::intern("bc"));
    }

    #[test]
    fn dangling_edges_are_skipped() {
        let mut c = canvas_with(&["a", "b"]);
        c.insert_edge(Edge::new(EdgeId::intern("ab"), NodeId::intern("a"), NodeId::intern("b")));
        c.insert_edge(Edge::new(EdgeId::intern("ax"), NodeId::intern("a"), NodeId::intern("ghost")));
        let resolved: Vec<_> = c.resolved_edges().map(|(e, _)| e.id).collect();
        assert_eq!(resolved, vec![EdgeId::intern("ab")]);
        let (_, line) = c.resolved_edges().next().unwrap();
        assert_eq!(line.p0, Point::new(160.0, 20.0));
        assert_eq!(line.p1, Point::new(200.0, 20.0));
    }

    #[test]
    fn resize_clamps_to_minimum() {
        let mut n = Node::new(NodeId::intern("r"), 0.0, 0.0, "r");
        n.resize(10.0, 5.0);
        assert_eq!((n.width, n.height), (MIN_NODE_WIDTH, MIN_NODE_HEIGHT));
        n.apply_measured_size(100.0, 90.0);
        assert_eq!((n.width, n.height), (DEFAULT_NODE_WIDTH, 90.0));
    }

    #[test]
    fn user_move_locks_and_logs() {
        let mut n = Node::new(NodeId::intern("m"), 0.0, 0.0, "m");
        let at = Utc::now();
        n.move_by_user(40.0, 60.0, at);
        assert!(n.locked);
        assert_eq!(n.history, vec![PositionSnapshot { x: 40.0, y: 60.0, at }]);
    }

    #[test]
    fn neighbors_are_unique() {
        let mut c = canvas_with(&["a", "b"]);
        c.insert_edge(Edge::new(EdgeId::intern("1"), NodeId::intern("a"), NodeId::intern("b")));
        c.insert_edge(Edge::new(EdgeId::intern("2"), NodeId::intern("b"), NodeId::intern("a")));
        assert_eq!(c.neighbors(NodeId::intern("a")), vec![NodeId::intern("b")]);
    }

    #[test]
    fn node_json_uses_short_size_keys() {
        let json = r#"{"id":"n1","x":200,"y":180,"label":"Computer","important":true}"#;
        let n: Node = serde_json::from_str(json).unwrap();
        assert_eq!(n.width, DEFAULT_NODE_WIDTH);
        assert!(n.important);
        let out = serde_json::to_value(&n).unwrap();
        assert_eq!(out["w"], 160.0);
        assert!(out.get("locked").is_none());
    }
}
