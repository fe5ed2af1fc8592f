//! Operation applier: runs an ordered operation list against a store.
//!
//! Operations apply strictly in order. `create_child_canvas` switches to
//! the new canvas immediately, so later operations without an explicit
//! `targetCanvas` land in it. Reference errors skip only the offending
//! entity or operation; they are logged and recorded in the report.

use crate::ops::{EdgeDraft, NodeDraft, Operation};
use chrono::{DateTime, Utc};
use kurbo::{Point, Size};
use mg_core::id::{CanvasId, EdgeId, NodeId};
use mg_core::model::{Canvas, DEFAULT_NODE_HEIGHT, DEFAULT_NODE_WIDTH, Edge, Node};
use mg_core::placement::{PlacementConfig, place};
use mg_core::store::{AnchorTarget, CanvasStore, StoreError};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Serialize, Serializer};

/// Horizontal clearance between an attach anchor and its first new node.
const ATTACH_OFFSET_X: f64 = 40.0;
/// Per-sibling stagger next to an attach anchor.
const ATTACH_STEP_X: f64 = 40.0;
const ATTACH_STEP_Y: f64 = 60.0;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ApplyError {
    #[error("unknown canvas `{0}`")]
    UnknownCanvas(CanvasId),
    #[error("node `{0}` not found")]
    UnknownNode(NodeId),
    #[error("edge `{0}` not found")]
    UnknownEdge(EdgeId),
    #[error("node id `{0}` already exists")]
    DuplicateNode(NodeId),
    #[error("edge id `{0}` already exists")]
    DuplicateEdge(EdgeId),
    #[error("create_child_canvas needs a nodeId or an edgeId")]
    MissingAnchor,
    #[error(transparent)]
    Store(#[from] StoreError),
}

fn display<T: std::fmt::Display, S: Serializer>(value: &T, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(value)
}

/// An operation, or one entity of it, that was not applied.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedOp {
    /// Position in the operation list.
    pub index: usize,
    pub op: &'static str,
    #[serde(rename = "reason", serialize_with = "display")]
    pub error: ApplyError,
}

/// Outcome of one `apply` call.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyReport {
    /// Operations that ran (possibly with some entities skipped).
    pub applied: usize,
    pub skipped: Vec<SkippedOp>,
    pub added_nodes: Vec<NodeId>,
    pub added_edges: Vec<EdgeId>,
    pub removed_nodes: usize,
    pub removed_edges: usize,
    pub created_canvases: Vec<CanvasId>,
    /// Last canvas switched to by `create_child_canvas`.
    pub switched_to: Option<CanvasId>,
}

impl ApplyReport {
    fn skip(&mut self, index: usize, op: &'static str, error: ApplyError) {
        log::warn!("skipping {op} (#{index}): {error}");
        self.skipped.push(SkippedOp { index, op, error });
    }
}

// ─── Applier ─────────────────────────────────────────────────────────────

/// Applies operation lists with injected randomness and placement tunables.
#[derive(Debug, Clone)]
pub struct OpApplier<R = StdRng> {
    rng: R,
    placement: PlacementConfig,
}

impl OpApplier<StdRng> {
    /// Deterministic applier.
    pub fn seeded(seed: u64) -> Self {
        Self::new(StdRng::seed_from_u64(seed), PlacementConfig::default())
    }
}

impl<R: Rng> OpApplier<R> {
    pub fn new(rng: R, placement: PlacementConfig) -> Self {
        Self { rng, placement }
    }

    pub fn placement(&self) -> &PlacementConfig {
        &self.placement
    }

    pub fn apply(&mut self, store: &mut CanvasStore, ops: &[Operation]) -> ApplyReport {
        self.apply_at(store, ops, Utc::now())
    }

    /// Apply `ops` in order, stamping position history with `now`.
    pub fn apply_at(&mut self, store: &mut CanvasStore, ops: &[Operation], now: DateTime<Utc>) -> ApplyReport {
        let mut report = ApplyReport::default();
        for (index, op) in ops.iter().enumerate() {
            log::debug!("applying {} (#{index}) on {}", op.kind(), store.active_id());
            match self.apply_one(store, op, index, now, &mut report) {
                Ok(()) => report.applied += 1,
                Err(err) => report.skip(index, op.kind(), err),
            }
        }
        report
    }

    fn apply_one(
        &mut self,
        store: &mut CanvasStore,
        op: &Operation,
        index: usize,
        now: DateTime<Utc>,
        report: &mut ApplyReport,
    ) -> Result<(), ApplyError> {
        match op {
            Operation::AddNodes {
                nodes,
                attach_to,
                target_canvas,
            } => {
                let canvas = target(store, *target_canvas)?;
                let base = attach_to.and_then(|id| canvas.node(id)).map(|n| (n.x, n.y, n.width));
                for (i, draft) in nodes.iter().enumerate() {
                    match self.add_node(canvas, draft, i, base, now) {
                        Ok(id) => report.added_nodes.push(id),
                        Err(err) => report.skip(index, op.kind(), err),
                    }
                }
                Ok(())
            }
            Operation::AddEdges { edges, target_canvas } => {
                let canvas = target(store, *target_canvas)?;
                for draft in edges {
                    match add_edge(canvas, draft) {
                        Ok(id) => report.added_edges.push(id),
                        Err(err) => report.skip(index, op.kind(), err),
                    }
                }
                Ok(())
            }
            Operation::DeleteNodes { ids } => {
                let canvas = store.active_mut();
                let edges_before = canvas.edges.len();
                report.removed_nodes += canvas.remove_nodes(ids);
                report.removed_edges += edges_before - canvas.edges.len();
                Ok(())
            }
            Operation::DeleteEdges { ids } => {
                report.removed_edges += store.active_mut().remove_edges(ids);
                Ok(())
            }
            Operation::UpdateNode {
                id,
                label,
                name,
                summary,
            } => {
                let node = store
                    .active_mut()
                    .node_mut(*id)
                    .ok_or(ApplyError::UnknownNode(*id))?;
                overwrite(&mut node.label, label);
                overwrite_opt(&mut node.name, name);
                overwrite_opt(&mut node.summary, summary);
                Ok(())
            }
            Operation::UpdateEdge { id, name, summary } => {
                let edge = store
                    .active_mut()
                    .edge_mut(*id)
                    .ok_or(ApplyError::UnknownEdge(*id))?;
                overwrite_opt(&mut edge.name, name);
                overwrite_opt(&mut edge.summary, summary);
                Ok(())
            }
            Operation::CreateChildCanvas {
                node_id,
                edge_id,
                canvas_id,
                title,
            } => {
                let anchor = match (node_id, edge_id) {
                    (Some(id), _) => AnchorTarget::Node(*id),
                    (None, Some(id)) => AnchorTarget::Edge(*id),
                    (None, None) => return Err(ApplyError::MissingAnchor),
                };
                let title = match title.as_deref().filter(|t| !t.is_empty()) {
                    Some(t) => t.to_string(),
                    None => default_child_title(store, anchor),
                };
                let child = store.create_child_canvas(anchor, *canvas_id, title)?;
                store.switch_to(child)?;
                report.created_canvases.push(child);
                report.switched_to = Some(child);
                Ok(())
            }
        }
    }

    fn add_node(
        &mut self,
        canvas: &mut Canvas,
        draft: &NodeDraft,
        i: usize,
        base: Option<(f64, f64, f64)>,
        now: DateTime<Utc>,
    ) -> Result<NodeId, ApplyError> {
        let id = match draft.id {
            Some(id) if canvas.contains_node(id) => return Err(ApplyError::DuplicateNode(id)),
            Some(id) => id,
            None => fresh_node_id(canvas),
        };

        let step = i as f64;
        let x = match (draft.x, base) {
            (Some(x), _) => x,
            (None, Some((bx, _, bw))) => bx + bw + ATTACH_OFFSET_X + step * ATTACH_STEP_X,
            (None, None) => self.rng.random_range(200.0..900.0),
        };
        let y = match (draft.y, base) {
            (Some(y), _) => y,
            (None, Some((_, by, _))) => by + step * ATTACH_STEP_Y,
            (None, None) => self.rng.random_range(100.0..600.0),
        };

        let size = Size::new(DEFAULT_NODE_WIDTH, DEFAULT_NODE_HEIGHT);
        let placed = place(&canvas.rects(), Point::new(x, y), size, &self.placement);
        log::trace!("{id}: desired ({x:.1}, {y:.1}) -> {:?} via {:?}", placed.position, placed.tier);

        let label = draft.display_label().unwrap_or(id.as_str()).to_string();
        let mut node = Node::new(id, placed.position.x, placed.position.y, label);
        node.name = draft.name.clone();
        node.summary = draft.summary.clone();
        node.important = draft.important;
        node.record_position(now);
        canvas.insert_node(node);
        Ok(id)
    }
}

fn target(store: &mut CanvasStore, id: Option<CanvasId>) -> Result<&mut Canvas, ApplyError> {
    match id {
        Some(id) => store.canvas_mut(id).ok_or(ApplyError::UnknownCanvas(id)),
        None => Ok(store.active_mut()),
    }
}

fn add_edge(canvas: &mut Canvas, draft: &EdgeDraft) -> Result<EdgeId, ApplyError> {
    let id = match draft.id {
        Some(id) if canvas.contains_edge(id) => return Err(ApplyError::DuplicateEdge(id)),
        Some(id) => id,
        None => fresh_edge_id(canvas),
    };
    let mut edge = Edge::new(id, draft.source, draft.target);
    edge.name = draft.name.clone();
    edge.summary = draft.summary.clone();
    canvas.insert_edge(edge);
    Ok(id)
}

fn fresh_node_id(canvas: &Canvas) -> NodeId {
    loop {
        let id = NodeId::with_prefix("u");
        if !canvas.contains_node(id) {
            return id;
        }
    }
}

fn fresh_edge_id(canvas: &Canvas) -> EdgeId {
    loop {
        let id = EdgeId::with_prefix("e");
        if !canvas.contains_edge(id) {
            return id;
        }
    }
}

/// Empty strings count as "not supplied".
fn overwrite(field: &mut String, value: &Option<String>) {
    if let Some(v) = value.as_deref().filter(|v| !v.is_empty()) {
        *field = v.to_string();
    }
}

fn overwrite_opt(field: &mut Option<String>, value: &Option<String>) {
    if let Some(v) = value.as_deref().filter(|v| !v.is_empty()) {
        *field = Some(v.to_string());
    }
}

fn default_child_title(store: &CanvasStore, anchor: AnchorTarget) -> String {
    let label = store
        .locate(anchor)
        .and_then(|c| store.canvas(c))
        .and_then(|canvas| match anchor {
            AnchorTarget::Node(id) => canvas.node(id).map(|n| n.title().to_string()),
            AnchorTarget::Edge(id) => canvas.edge(id).and_then(|e| e.name.clone()),
        })
        .unwrap_or_else(|| anchor.id_str().to_string());
    format!("{label} - detail")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn store_with(nodes: &[(&str, f64, f64)]) -> CanvasStore {
        let mut store = CanvasStore::new();
        for (id, x, y) in nodes {
            store
                .active_mut()
                .insert_node(Node::new(NodeId::intern(id), *x, *y, *id));
        }
        store
    }

    fn add(nodes: Vec<NodeDraft>) -> Operation {
        Operation::AddNodes {
            nodes,
            attach_to: None,
            target_canvas: None,
        }
    }

    #[test]
    fn explicit_position_on_empty_canvas_is_kept() {
        let mut store = CanvasStore::new();
        let report = OpApplier::seeded(1).apply(&mut store, &[add(vec![NodeDraft::new("n", "N").at(200.0, 180.0)])]);
        let node = store.active().node(NodeId::intern("n")).unwrap();
        assert_eq!((node.x, node.y), (200.0, 180.0));
        assert_eq!(node.history.len(), 1);
        assert_eq!(report.added_nodes, vec![NodeId::intern("n")]);
    }

    #[test]
    fn attached_nodes_start_right_of_base() {
        let mut store = store_with(&[("base", 100.0, 100.0)]);
        let op = Operation::AddNodes {
            nodes: vec![NodeDraft::new("k1", "K1")],
            attach_to: Some(NodeId::intern("base")),
            target_canvas: None,
        };
        OpApplier::seeded(1).apply(&mut store, &[op]);
        let k1 = store.active().node(NodeId::intern("k1")).unwrap();
        // Desired (300, 100) collides with the base under a 50 gap.
        assert!(!mg_core::geometry::overlaps(
            k1.rect(),
            store.active().node(NodeId::intern("base")).unwrap().rect(),
            50.0
        ));
    }

    #[test]
    fn random_positions_are_seeded() {
        let run = |seed| {
            let mut store = CanvasStore::new();
            OpApplier::seeded(seed).apply(&mut store, &[add(vec![NodeDraft::new("r", "R")])]);
            let n = store.active().node(NodeId::intern("r")).unwrap().clone();
            (n.x, n.y)
        };
        assert_eq!(run(7), run(7));
        let (x, y) = run(7);
        assert!((200.0..900.0).contains(&x));
        assert!((100.0..600.0).contains(&y));
    }

    #[test]
    fn duplicate_node_is_skipped_alone() {
        let mut store = store_with(&[("a", 0.0, 0.0)]);
        let report = OpApplier::seeded(1).apply(
            &mut store,
            &[add(vec![NodeDraft::new("a", "again"), NodeDraft::new("b", "B")])],
        );
        assert_eq!(report.applied, 1);
        assert_eq!(report.added_nodes, vec![NodeId::intern("b")]);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].error, ApplyError::DuplicateNode(NodeId::intern("a")));
        assert_eq!(store.active().node(NodeId::intern("a")).unwrap().label, "a");
    }

    #[test]
    fn generated_ids_and_label_fallback() {
        let mut store = CanvasStore::new();
        let draft = NodeDraft {
            name: Some("Disk".into()),
            ..NodeDraft::default()
        };
        let report = OpApplier::seeded(1).apply(&mut store, &[add(vec![draft])]);
        let id = report.added_nodes[0];
        assert!(id.as_str().starts_with("u_"));
        assert_eq!(store.active().node(id).unwrap().label, "Disk");
    }

    #[test]
    fn unknown_target_canvas_skips_op() {
        let mut store = CanvasStore::new();
        let op = Operation::AddEdges {
            edges: vec![EdgeDraft::new("e", NodeId::intern("a"), NodeId::intern("b"))],
            target_canvas: Some(CanvasId::intern("nowhere")),
        };
        let report = OpApplier::seeded(1).apply(&mut store, &[op]);
        assert_eq!(report.applied, 0);
        assert_eq!(
            report.skipped[0].error,
            ApplyError::UnknownCanvas(CanvasId::intern("nowhere"))
        );
    }

    #[test]
    fn delete_nodes_counts_incident_edges() {
        let mut store = store_with(&[("a", 0.0, 0.0), ("b", 300.0, 0.0)]);
        store
            .active_mut()
            .insert_edge(Edge::new(EdgeId::intern("ab"), NodeId::intern("a"), NodeId::intern("b")));
        let report = OpApplier::seeded(1).apply(
            &mut store,
            &[Operation::DeleteNodes {
                ids: vec![NodeId::intern("a"), NodeId::intern("ghost")],
            }],
        );
        assert_eq!(report.removed_nodes, 1);
        assert_eq!(report.removed_edges, 1);
    }

    #[test]
    fn child_title_defaults_to_anchor_label() {
        let mut store = store_with(&[("cpu", 0.0, 0.0)]);
        let op = Operation::CreateChildCanvas {
            node_id: Some(NodeId::intern("cpu")),
            edge_id: None,
            canvas_id: None,
            title: None,
        };
        let report = OpApplier::seeded(1).apply(&mut store, &[op]);
        assert_eq!(report.switched_to, Some(CanvasId::intern("c-cpu")));
        assert_eq!(store.active().title, "cpu - detail");
    }

    #[test]
    fn child_canvas_without_anchor_is_skipped() {
        let mut store = CanvasStore::new();
        let op = Operation::CreateChildCanvas {
            node_id: None,
            edge_id: None,
            canvas_id: None,
            title: None,
        };
        let report = OpApplier::seeded(1).apply(&mut store, &[op]);
        assert_eq!(report.skipped[0].error, ApplyError::MissingAnchor);
    }

    #[test]
    fn report_serializes_reasons_as_text() {
        let mut store = CanvasStore::new();
        let report = OpApplier::seeded(1).apply(
            &mut store,
            &[Operation::UpdateEdge {
                id: EdgeId::intern("nope"),
                name: None,
                summary: None,
            }],
        );
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["skipped"][0]["reason"], "edge `nope` not found");
        assert_eq!(json["skipped"][0]["op"], "update_edge");
    }
}
