//! Hit testing: canvas point → node / edge lookup, and marquee selection.
//!
//! All coordinates are canvas space; convert pointer positions with
//! [`ViewportEngine::to_canvas_point`](crate::viewport::ViewportEngine::to_canvas_point)
//! first.

use kurbo::{Line, ParamCurveNearest, Point, Rect};
use mg_core::id::{EdgeId, NodeId};
use mg_core::model::Canvas;
use serde::{Deserialize, Serialize};

/// Selected nodes and edges of one canvas.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    #[serde(default)]
    pub nodes: Vec<NodeId>,
    #[serde(default)]
    pub edges: Vec<EdgeId>,
}

impl Selection {
    pub fn node(id: NodeId) -> Self {
        Self {
            nodes: vec![id],
            edges: Vec::new(),
        }
    }

    pub fn edge(id: EdgeId) -> Self {
        Self {
            nodes: Vec::new(),
            edges: vec![id],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }
}

/// Find the topmost node at `p`. Returns `None` on the background.
pub fn hit_test(canvas: &Canvas, p: Point) -> Option<NodeId> {
    // Last painted = topmost
    canvas
        .nodes
        .iter()
        .rev()
        .find(|n| n.rect().contains(p))
        .map(|n| n.id)
}

/// Find the topmost edge whose drawn segment passes within `tolerance`
/// of `p`. Dangling edges are never hit.
pub fn hit_test_edge(canvas: &Canvas, p: Point, tolerance: f64) -> Option<EdgeId> {
    let limit = tolerance * tolerance;
    canvas
        .resolved_edges()
        .filter(|(_, line)| line.nearest(p, 1e-6).distance_sq <= limit)
        .last()
        .map(|(e, _)| e.id)
}

/// Marquee selection between two corner points: nodes whose rectangle
/// touches the marquee, and edges whose segment has an endpoint inside it
/// or crosses one of its sides.
pub fn select_in_rect(canvas: &Canvas, a: Point, b: Point) -> Selection {
    let marquee = Rect::from_points(a, b);
    let nodes = canvas
        .nodes
        .iter()
        .filter(|n| touches(n.rect(), marquee))
        .map(|n| n.id)
        .collect();
    let edges = canvas
        .resolved_edges()
        .filter(|(_, line)| segment_touches_rect(*line, marquee))
        .map(|(e, _)| e.id)
        .collect();
    Selection { nodes, edges }
}

/// Closed-interval rectangle intersection: shared borders count.
fn touches(a: Rect, b: Rect) -> bool {
    !(a.x1 < b.x0 || a.x0 > b.x1 || a.y1 < b.y0 || a.y0 > b.y1)
}

fn contains_closed(r: Rect, p: Point) -> bool {
    p.x >= r.x0 && p.x <= r.x1 && p.y >= r.y0 && p.y <= r.y1
}

fn segment_touches_rect(line: Line, r: Rect) -> bool {
    if contains_closed(r, line.p0) || contains_closed(r, line.p1) {
        return true;
    }
    let corners = [
        Point::new(r.x0, r.y0),
        Point::new(r.x1, r.y0),
        Point::new(r.x1, r.y1),
        Point::new(r.x0, r.y1),
    ];
    (0..4).any(|i| segments_intersect(line, Line::new(corners[i], corners[(i + 1) % 4])))
}

fn cross(a: kurbo::Vec2, b: kurbo::Vec2) -> f64 {
    a.x * b.y - a.y * b.x
}

fn within(a: Point, b: Point, c: Point) -> bool {
    a.x.min(b.x) <= c.x && c.x <= a.x.max(b.x) && a.y.min(b.y) <= c.y && c.y <= a.y.max(b.y)
}

/// Closed segment intersection, collinear overlaps included.
fn segments_intersect(p: Line, q: Line) -> bool {
    let d1 = p.p1 - p.p0;
    let d2 = q.p1 - q.p0;
    let w = q.p0 - p.p0;
    let denom = cross(d1, d2);
    if denom == 0.0 {
        if cross(w, d1) != 0.0 {
            return false;
        }
        return within(p.p0, p.p1, q.p0)
            || within(p.p0, p.p1, q.p1)
            || within(q.p0, q.p1, p.p0)
            || within(q.p0, q.p1, p.p1);
    }
    let t = cross(w, d2) / denom;
    let u = cross(w, d1) / denom;
    (0.0..=1.0).contains(&t) && (0.0..=1.0).contains(&u)
}
