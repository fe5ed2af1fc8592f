//! Canvas graph store: the canvas hierarchy of one session.
//!
//! The hierarchy is a tree kept in a `StableDiGraph`: tree edges go from a
//! parent canvas to a child canvas and carry the anchor (node or edge of the
//! parent) the child is attached to. A unified anchor map gives the reverse
//! lookup from anchor to child canvas. Alongside the tree the store keeps the
//! active canvas and the breadcrumb stack leading to it.

use crate::id::{CanvasId, EdgeId, NodeId};
use crate::model::Canvas;
use petgraph::Direction;
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::visit::{Bfs, Dfs, EdgeRef};
use serde::{Deserialize, Serialize};
use smallvec::{SmallVec, smallvec};
use std::collections::HashMap;
use std::fmt;

/// Title given to a fresh root canvas.
pub const ROOT_TITLE: &str = "Main canvas";

// ─── Anchors ─────────────────────────────────────────────────────────────

/// The element of a parent canvas a child canvas drills into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum AnchorTarget {
    Node(NodeId),
    Edge(EdgeId),
}

impl AnchorTarget {
    pub fn id_str(&self) -> &str {
        match self {
            Self::Node(id) => id.as_str(),
            Self::Edge(id) => id.as_str(),
        }
    }

    /// Whether `canvas` holds the anchored element.
    pub fn is_in(&self, canvas: &Canvas) -> bool {
        match self {
            Self::Node(id) => canvas.contains_node(*id),
            Self::Edge(id) => canvas.contains_edge(*id),
        }
    }
}

impl fmt::Display for AnchorTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Node(id) => write!(f, "node {id}"),
            Self::Edge(id) => write!(f, "edge {id}"),
        }
    }
}

/// An anchor target qualified by the canvas that holds it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Anchor {
    pub canvas: CanvasId,
    pub target: AnchorTarget,
}

// ─── Breadcrumb ──────────────────────────────────────────────────────────

/// One breadcrumb entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Crumb {
    pub id: CanvasId,
    pub title: String,
}

pub type CanvasStack = SmallVec<[Crumb; 4]>;

/// One row of the canvas tree listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutlineEntry {
    pub id: CanvasId,
    pub title: String,
    pub depth: usize,
    pub anchor: Option<AnchorTarget>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("unknown canvas `{0}`")]
    UnknownCanvas(CanvasId),
    #[error("{target} already has child canvas `{existing}`")]
    DuplicateAnchor {
        target: AnchorTarget,
        existing: CanvasId,
    },
    #[error("{0} is not on any canvas")]
    AnchorNotFound(AnchorTarget),
    #[error("canvas `{0}` already exists")]
    CanvasExists(CanvasId),
}

// ─── Store ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct CanvasStore {
    pub(crate) canvases: HashMap<CanvasId, Canvas>,
    /// Parent → child containment, weighted by the anchor in the parent.
    pub(crate) tree: StableDiGraph<CanvasId, AnchorTarget>,
    pub(crate) tree_index: HashMap<CanvasId, NodeIndex>,
    /// Creation sequence per canvas. Tree indices are reused after removal.
    pub(crate) created: HashMap<CanvasId, u64>,
    pub(crate) next_seq: u64,
    pub(crate) anchors: HashMap<Anchor, CanvasId>,
    pub(crate) stack: CanvasStack,
    pub(crate) active: CanvasId,
}

impl Default for CanvasStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CanvasStore {
    /// A store holding only an empty root canvas.
    pub fn new() -> Self {
        Self::with_root(Canvas::new(CanvasId::root(), ROOT_TITLE))
    }

    /// A store whose root canvas is `root`. The canvas id is forced to the
    /// root id.
    pub fn with_root(mut root: Canvas) -> Self {
        root.id = CanvasId::root();
        let stack = smallvec![Crumb {
            id: root.id,
            title: root.title.clone(),
        }];

        let mut store = Self {
            canvases: HashMap::new(),
            tree: StableDiGraph::new(),
            tree_index: HashMap::new(),
            created: HashMap::new(),
            next_seq: 0,
            anchors: HashMap::new(),
            stack,
            active: CanvasId::root(),
        };
        store.register(root.id);
        store.canvases.insert(root.id, root);
        store
    }

    /// Add `id` to the tree and stamp its creation sequence.
    pub(crate) fn register(&mut self, id: CanvasId) -> NodeIndex {
        let idx = self.tree.add_node(id);
        self.tree_index.insert(id, idx);
        self.created.insert(id, self.next_seq);
        self.next_seq += 1;
        idx
    }

    // ─── Lookup ──────────────────────────────────────────────────────────

    pub fn root_id(&self) -> CanvasId {
        CanvasId::root()
    }

    pub fn active_id(&self) -> CanvasId {
        self.active
    }

    pub fn active(&self) -> &Canvas {
        &self.canvases[&self.active]
    }

    pub fn active_mut(&mut self) -> &mut Canvas {
        let id = self.active;
        self.canvases
            .entry(id)
            .or_insert_with(|| Canvas::new(id, String::new()))
    }

    pub fn canvas(&self, id: CanvasId) -> Option<&Canvas> {
        self.canvases.get(&id)
    }

    pub fn canvas_mut(&mut self, id: CanvasId) -> Option<&mut Canvas> {
        self.canvases.get_mut(&id)
    }

    pub fn contains(&self, id: CanvasId) -> bool {
        self.canvases.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.canvases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.canvases.is_empty()
    }

    /// Breadcrumb from the root to the active canvas.
    pub fn stack(&self) -> &[Crumb] {
        &self.stack
    }

    pub fn parent_of(&self, id: CanvasId) -> Option<CanvasId> {
        let idx = *self.tree_index.get(&id)?;
        self.tree
            .neighbors_directed(idx, Direction::Incoming)
            .next()
            .map(|p| self.tree[p])
    }

    /// The anchor a child canvas hangs from; `None` for the root.
    pub fn anchor_of(&self, id: CanvasId) -> Option<Anchor> {
        let idx = *self.tree_index.get(&id)?;
        self.tree
            .edges_directed(idx, Direction::Incoming)
            .next()
            .map(|e| Anchor {
                canvas: self.tree[e.source()],
                target: *e.weight(),
            })
    }

    pub fn child_of(&self, anchor: &Anchor) -> Option<CanvasId> {
        self.anchors.get(anchor).copied()
    }

    /// Child canvas of an element of the active canvas.
    pub fn child_of_active(&self, target: AnchorTarget) -> Option<CanvasId> {
        self.child_of(&Anchor {
            canvas: self.active,
            target,
        })
    }

    /// Direct children in creation order.
    pub fn children(&self, id: CanvasId) -> Vec<CanvasId> {
        let Some(&idx) = self.tree_index.get(&id) else {
            return Vec::new();
        };
        let mut children: Vec<CanvasId> = self
            .tree
            .neighbors_directed(idx, Direction::Outgoing)
            .map(|c| self.tree[c])
            .collect();
        children.sort_by_key(|c| self.created.get(c).copied().unwrap_or(u64::MAX));
        children
    }

    /// Canvas ids from the root down to `id` (inclusive).
    pub fn path_to(&self, id: CanvasId) -> Vec<CanvasId> {
        let mut path = vec![id];
        let mut cur = id;
        while let Some(parent) = self.parent_of(cur) {
            path.push(parent);
            cur = parent;
        }
        path.reverse();
        path
    }

    /// Depth-first listing of the whole hierarchy, root first.
    pub fn outline(&self) -> Vec<OutlineEntry> {
        let mut out = Vec::new();
        self.outline_from(self.root_id(), 0, &mut out);
        out
    }

    fn outline_from(&self, id: CanvasId, depth: usize, out: &mut Vec<OutlineEntry>) {
        let Some(canvas) = self.canvases.get(&id) else {
            return;
        };
        out.push(OutlineEntry {
            id,
            title: canvas.title.clone(),
            depth,
            anchor: self.anchor_of(id).map(|a| a.target),
        });
        for child in self.children(id) {
            self.outline_from(child, depth + 1, out);
        }
    }

    /// Canvas holding `target`: the active canvas if it does, otherwise the
    /// first one breadth-first from the root.
    pub fn locate(&self, target: AnchorTarget) -> Option<CanvasId> {
        if target.is_in(self.active()) {
            return Some(self.active);
        }
        let start = *self.tree_index.get(&self.root_id())?;
        let mut bfs = Bfs::new(&self.tree, start);
        while let Some(idx) = bfs.next(&self.tree) {
            let id = self.tree[idx];
            if self.canvases.get(&id).is_some_and(|c| target.is_in(c)) {
                return Some(id);
            }
        }
        None
    }

    // ─── Navigation ──────────────────────────────────────────────────────

    /// Make `id` the active canvas.
    ///
    /// Re-visiting a canvas already on the breadcrumb truncates back to it;
    /// any other canvas gets the breadcrumb of its ancestor path, which for
    /// a child of the current canvas is a plain push.
    pub fn switch_to(&mut self, id: CanvasId) -> Result<(), StoreError> {
        if !self.contains(id) {
            return Err(StoreError::UnknownCanvas(id));
        }
        if let Some(pos) = self.stack.iter().position(|c| c.id == id) {
            self.stack.truncate(pos + 1);
        } else {
            self.stack = self.crumbs_for(id);
        }
        self.active = id;
        log::debug!("switched to canvas {id} (depth {})", self.stack.len() - 1);
        Ok(())
    }

    /// Pop one breadcrumb level. Returns `false` at the root.
    pub fn back(&mut self) -> bool {
        if self.stack.len() <= 1 {
            self.active = self.root_id();
            return false;
        }
        self.stack.pop();
        if let Some(top) = self.stack.last() {
            self.active = top.id;
        }
        true
    }

    /// Enter the child canvas of an element on the active canvas.
    /// Returns `None` when the element has no child canvas.
    pub fn enter_anchor(&mut self, target: AnchorTarget) -> Option<CanvasId> {
        let Some(child) = self.child_of_active(target) else {
            log::debug!("{target} has no child canvas");
            return None;
        };
        self.switch_to(child).ok()?;
        Some(child)
    }

    fn crumbs_for(&self, id: CanvasId) -> CanvasStack {
        self.path_to(id)
            .into_iter()
            .filter_map(|c| {
                self.canvases.get(&c).map(|canvas| Crumb {
                    id: c,
                    title: canvas.title.clone(),
                })
            })
            .collect()
    }

    // ─── Hierarchy mutation ──────────────────────────────────────────────

    /// Create a child canvas anchored to `target`. Does not switch to it.
    ///
    /// The id defaults to `c-<anchor id>`. An anchor that already has a
    /// child canvas is rejected and keeps its existing mapping.
    pub fn create_child_canvas(
        &mut self,
        target: AnchorTarget,
        id: Option<CanvasId>,
        title: impl Into<String>,
    ) -> Result<CanvasId, StoreError> {
        let parent = self
            .locate(target)
            .ok_or(StoreError::AnchorNotFound(target))?;
        let anchor = Anchor {
            canvas: parent,
            target,
        };
        if let Some(&existing) = self.anchors.get(&anchor) {
            return Err(StoreError::DuplicateAnchor { target, existing });
        }

        let id = id.unwrap_or_else(|| CanvasId::intern(&format!("c-{}", target.id_str())));
        if self.contains(id) {
            return Err(StoreError::CanvasExists(id));
        }

        let parent_idx = self.tree_index[&parent];
        let idx = self.register(id);
        self.tree.add_edge(parent_idx, idx, target);
        self.anchors.insert(anchor, id);
        self.canvases.insert(id, Canvas::new(id, title));
        log::debug!("created child canvas {id} on {target} of {parent}");
        Ok(id)
    }

    /// Delete a canvas.
    ///
    /// The root is soft-deleted: its nodes and edges are cleared and every
    /// child canvas goes with them. Any other canvas is removed together
    /// with all of its descendants and their anchors. Returns the ids of the
    /// removed canvases (the root itself is never removed).
    pub fn delete_canvas(&mut self, id: CanvasId) -> Result<Vec<CanvasId>, StoreError> {
        if !self.contains(id) {
            return Err(StoreError::UnknownCanvas(id));
        }

        if id.is_root() {
            let mut removed = Vec::new();
            for child in self.children(id) {
                removed.extend(self.remove_subtree(child));
            }
            if let Some(root) = self.canvases.get_mut(&id) {
                root.clear();
            }
            self.stack = self.crumbs_for(id);
            self.active = id;
            return Ok(removed);
        }

        let parent = self.parent_of(id).unwrap_or_else(|| self.root_id());
        let removed = self.remove_subtree(id);
        if removed.contains(&self.active) {
            self.switch_to(parent)?;
        }
        Ok(removed)
    }

    fn remove_subtree(&mut self, id: CanvasId) -> Vec<CanvasId> {
        let Some(&start) = self.tree_index.get(&id) else {
            return Vec::new();
        };
        let mut doomed = Vec::new();
        let mut dfs = Dfs::new(&self.tree, start);
        while let Some(idx) = dfs.next(&self.tree) {
            doomed.push(idx);
        }

        let removed: Vec<CanvasId> = doomed.iter().map(|&idx| self.tree[idx]).collect();
        for idx in doomed {
            self.tree.remove_node(idx);
        }
        for cid in &removed {
            self.tree_index.remove(cid);
            self.created.remove(cid);
            self.canvases.remove(cid);
        }
        self.anchors.retain(|_, child| !removed.contains(child));
        log::debug!("removed canvases {removed:?}");
        removed
    }

    pub fn rename_canvas(&mut self, id: CanvasId, title: impl Into<String>) -> Result<(), StoreError> {
        let title = title.into();
        let canvas = self
            .canvases
            .get_mut(&id)
            .ok_or(StoreError::UnknownCanvas(id))?;
        canvas.title = title.clone();
        for crumb in self.stack.iter_mut().filter(|c| c.id == id) {
            crumb.title = title.clone();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Edge, Node};

    fn node(id: &str) -> NodeId {
        NodeId::intern(id)
    }

    /// main: n1, n2 (edge e1); c-n1 anchored at n1 holding n1-1.
    fn demo() -> CanvasStore {
        let mut store = CanvasStore::new();
        let main = store.active_mut();
        main.insert_node(Node::new(node("n1"), 200.0, 180.0, "Computer"));
        main.insert_node(Node::new(node("n2"), 480.0, 180.0, "Hardware"));
        main.insert_edge(Edge::new(EdgeId::intern("e1"), node("n1"), node("n2")));
        let child = store
            .create_child_canvas(AnchorTarget::Node(node("n1")), None, "Computer - detail")
            .unwrap();
        store
            .canvas_mut(child)
            .unwrap()
            .insert_node(Node::new(node("n1-1"), 300.0, 240.0, "Architecture"));
        store
    }

    #[test]
    fn fresh_store_has_root_only() {
        let store = CanvasStore::new();
        assert_eq!(store.len(), 1);
        assert!(store.active_id().is_root());
        assert_eq!(store.stack().len(), 1);
        assert_eq!(store.stack()[0].id, CanvasId::root());
    }

    #[test]
    fn child_canvas_is_mapped_both_ways() {
        let store = demo();
        let child = CanvasId::intern("c-n1");
        let anchor = Anchor {
            canvas: CanvasId::root(),
            target: AnchorTarget::Node(node("n1")),
        };
        assert_eq!(store.child_of(&anchor), Some(child));
        assert_eq!(store.anchor_of(child), Some(anchor));
        assert_eq!(store.parent_of(child), Some(CanvasId::root()));
        assert!(store.anchor_of(CanvasId::root()).is_none());
    }

    #[test]
    fn duplicate_anchor_is_rejected() {
        let mut store = demo();
        let err = store
            .create_child_canvas(AnchorTarget::Node(node("n1")), Some(CanvasId::intern("other")), "x")
            .unwrap_err();
        assert_eq!(
            err,
            StoreError::DuplicateAnchor {
                target: AnchorTarget::Node(node("n1")),
                existing: CanvasId::intern("c-n1"),
            }
        );
        assert!(!store.contains(CanvasId::intern("other")));
        assert_eq!(
            store.child_of_active(AnchorTarget::Node(node("n1"))),
            Some(CanvasId::intern("c-n1"))
        );
    }

    #[test]
    fn missing_anchor_is_rejected() {
        let mut store = demo();
        let err = store
            .create_child_canvas(AnchorTarget::Node(node("ghost")), None, "x")
            .unwrap_err();
        assert_eq!(err, StoreError::AnchorNotFound(AnchorTarget::Node(node("ghost"))));
    }

    #[test]
    fn edge_and_node_anchors_share_the_map() {
        let mut store = demo();
        let c = store
            .create_child_canvas(AnchorTarget::Edge(EdgeId::intern("e1")), None, "Relation")
            .unwrap();
        assert_eq!(c, CanvasId::intern("c-e1"));
        assert_eq!(store.children(CanvasId::root()), vec![CanvasId::intern("c-n1"), c]);
    }

    #[test]
    fn switching_truncates_on_revisit() {
        let mut store = demo();
        let child = CanvasId::intern("c-n1");
        store.switch_to(child).unwrap();
        let grand = store
            .create_child_canvas(AnchorTarget::Node(node("n1-1")), None, "Architecture - detail")
            .unwrap();
        store.switch_to(grand).unwrap();
        let ids: Vec<_> = store.stack().iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![CanvasId::root(), child, grand]);

        store.switch_to(CanvasId::root()).unwrap();
        assert_eq!(store.stack().len(), 1);

        // Jumping straight to a grandchild rebuilds the ancestor path.
        store.switch_to(grand).unwrap();
        let ids: Vec<_> = store.stack().iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![CanvasId::root(), child, grand]);
    }

    #[test]
    fn switching_to_unknown_canvas_fails() {
        let mut store = demo();
        assert_eq!(
            store.switch_to(CanvasId::intern("nope")),
            Err(StoreError::UnknownCanvas(CanvasId::intern("nope")))
        );
        assert!(store.active_id().is_root());
    }

    #[test]
    fn back_pops_one_level() {
        let mut store = demo();
        store.switch_to(CanvasId::intern("c-n1")).unwrap();
        assert!(store.back());
        assert!(store.active_id().is_root());
        assert!(!store.back());
    }

    #[test]
    fn enter_anchor_switches_into_child() {
        let mut store = demo();
        assert_eq!(
            store.enter_anchor(AnchorTarget::Node(node("n1"))),
            Some(CanvasId::intern("c-n1"))
        );
        assert_eq!(store.active_id(), CanvasId::intern("c-n1"));
        assert_eq!(store.enter_anchor(AnchorTarget::Node(node("n2"))), None);
    }

    #[test]
    fn deleting_child_cascades_to_descendants() {
        let mut store = demo();
        let child = CanvasId::intern("c-n1");
        store.switch_to(child).unwrap();
        let grand = store
            .create_child_canvas(AnchorTarget::Node(node("n1-1")), None, "deep")
            .unwrap();
        store.switch_to(grand).unwrap();

        let mut removed = store.delete_canvas(child).unwrap();
        removed.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        assert_eq!(removed, vec![child, grand]);
        assert!(!store.contains(grand));
        assert!(store.anchors.is_empty());
        assert!(store.active_id().is_root());
        assert_eq!(store.stack().len(), 1);
        // The anchor is free again.
        assert!(store
            .create_child_canvas(AnchorTarget::Node(node("n1")), None, "again")
            .is_ok());
    }

    #[test]
    fn deleting_root_clears_everything() {
        let mut store = demo();
        store.switch_to(CanvasId::intern("c-n1")).unwrap();
        let removed = store.delete_canvas(CanvasId::root()).unwrap();
        assert_eq!(removed, vec![CanvasId::intern("c-n1")]);
        assert_eq!(store.len(), 1);
        assert!(store.active().nodes.is_empty());
        assert!(store.active().edges.is_empty());
        assert!(store.active_id().is_root());
    }

    #[test]
    fn rename_updates_breadcrumb() {
        let mut store = demo();
        let child = CanvasId::intern("c-n1");
        store.switch_to(child).unwrap();
        store.rename_canvas(child, "Renamed").unwrap();
        assert_eq!(store.stack()[1].title, "Renamed");
        assert_eq!(store.canvas(child).unwrap().title, "Renamed");
    }

    #[test]
    fn outline_lists_depth_first() {
        let store = demo();
        let outline = store.outline();
        assert_eq!(outline.len(), 2);
        assert_eq!(outline[0].depth, 0);
        assert_eq!(outline[1].id, CanvasId::intern("c-n1"));
        assert_eq!(outline[1].anchor, Some(AnchorTarget::Node(node("n1"))));
    }

    #[test]
    fn children_keep_creation_order_after_removal() {
        let mut store = demo();
        store
            .create_child_canvas(AnchorTarget::Node(node("n2")), None, "Hardware - detail")
            .unwrap();
        store.delete_canvas(CanvasId::intern("c-n1")).unwrap();
        // The freed tree slot is reused by the newest canvas.
        store
            .create_child_canvas(AnchorTarget::Edge(EdgeId::intern("e1")), None, "Relation")
            .unwrap();
        assert_eq!(
            store.children(CanvasId::root()),
            vec![CanvasId::intern("c-n2"), CanvasId::intern("c-e1")]
        );
        let titles: Vec<_> = store.outline().into_iter().map(|e| e.title).collect();
        assert_eq!(titles, vec!["Main canvas", "Hardware - detail", "Relation"]);
    }

    #[test]
    fn anchor_target_json_is_tagged() {
        let t = AnchorTarget::Edge(EdgeId::intern("e1"));
        assert_eq!(
            serde_json::to_string(&t).unwrap(),
            r#"{"kind":"edge","id":"e1"}"#
        );
    }
}
