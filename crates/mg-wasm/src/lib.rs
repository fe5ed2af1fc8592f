//! WASM bridge for MindGraph: exposes sessions, canvases, the viewport and
//! the AI exchange to a JavaScript host.
//!
//! Compiled via `wasm-pack build --target web`. Structured values cross the
//! boundary as JSON strings; failures come back as `{"error": "..."}` or
//! `false`.

use kurbo::{Point, Size};
use mg_core::id::{CanvasId, EdgeId, NodeId};
use mg_core::session::{SessionId, SessionRegistry};
use mg_core::snapshot::RegistrySnapshot;
use mg_core::store::AnchorTarget;
use mg_editor::apply::OpApplier;
use mg_editor::assistant::Assistant;
use mg_editor::collab::{AiResponse, CollabError};
use mg_editor::config::EditorConfig;
use mg_editor::edits::{Edit, apply_edit};
use mg_editor::hit::{Selection, hit_test, hit_test_edge, select_in_rect};
use mg_editor::input::InputEvent;
use mg_editor::stub::StubCollaborator;
use mg_editor::viewport::ViewportEngine;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde_json::{Value, json};
use wasm_bindgen::prelude::*;

/// Edge pick radius in screen pixels.
const EDGE_PICK_PX: f64 = 6.0;

fn error_json(err: impl std::fmt::Display) -> String {
    json!({ "error": err.to_string() }).to_string()
}

fn to_json(value: &impl serde::Serialize) -> String {
    serde_json::to_string(value).unwrap_or_else(error_json)
}

fn entropy_seed() -> u64 {
    #[cfg(target_arch = "wasm32")]
    {
        (js_sys::Math::random() * u64::MAX as f64) as u64 ^ js_sys::Date::now() as u64
    }
    #[cfg(not(target_arch = "wasm32"))]
    {
        rand::random()
    }
}

fn assistant_for(config: &EditorConfig) -> Assistant {
    Assistant::new(OpApplier::new(
        StdRng::seed_from_u64(entropy_seed()),
        config.placement.clone(),
    ))
}

/// The WASM-facing editor controller.
///
/// Owns every session, the viewport and the assistant. All interaction
/// from the host page goes through this struct.
#[wasm_bindgen]
pub struct MindCanvas {
    registry: SessionRegistry,
    viewport: ViewportEngine,
    assistant: Assistant,
    config: EditorConfig,
    selection: Selection,
    /// Session the outstanding request belongs to.
    pending_session: Option<SessionId>,
}

#[wasm_bindgen]
impl MindCanvas {
    #[wasm_bindgen(constructor)]
    pub fn new(width: f64, height: f64) -> Self {
        init_console(log::Level::Info);

        let config = EditorConfig::default();
        let mut viewport = ViewportEngine::new(config.viewport.clone());
        viewport.set_view_size(Size::new(width, height));
        Self {
            registry: SessionRegistry::new(),
            viewport,
            assistant: assistant_for(&config),
            config,
            selection: Selection::default(),
            pending_session: None,
        }
    }

    /// Replace the editor configuration from JSON. Resets the view.
    pub fn set_config(&mut self, json: &str) -> bool {
        let config = match EditorConfig::from_json(json) {
            Ok(c) => c.sanitized(),
            Err(err) => {
                log::warn!("rejected config: {err}");
                return false;
            }
        };
        let mut viewport = ViewportEngine::new(config.viewport.clone());
        if let Some(size) = self.viewport.view_size() {
            viewport.set_view_size(size);
        }
        self.viewport = viewport;
        if self.pending_session.is_none() {
            self.assistant = assistant_for(&config);
        }
        self.config = config;
        true
    }

    pub fn config_json(&self) -> String {
        to_json(&self.config)
    }

    /// `"error"`, `"warn"`, `"info"`, `"debug"` or `"trace"`.
    pub fn set_log_level(&mut self, level: &str) -> bool {
        match level.parse() {
            Ok(level) => {
                init_console(level);
                true
            }
            Err(_) => false,
        }
    }

    // ─── Sessions ────────────────────────────────────────────────────────

    /// `[{id, title, active, canvases}]` in creation order.
    pub fn sessions_json(&self) -> String {
        let active = self.registry.active_id();
        let list: Vec<Value> = self
            .registry
            .iter()
            .map(|s| {
                json!({
                    "id": s.id,
                    "title": s.title,
                    "active": &s.id == active,
                    "canvases": s.store.len(),
                })
            })
            .collect();
        Value::Array(list).to_string()
    }

    /// Create a session, make it active and return its id.
    pub fn create_session(&mut self, title: &str) -> String {
        let id = self.registry.create(title).id.to_string();
        self.show_active_canvas();
        id
    }

    pub fn switch_session(&mut self, id: &str) -> bool {
        let ok = self.registry.switch(&SessionId::new(id)).is_ok();
        if ok {
            self.show_active_canvas();
        }
        ok
    }

    pub fn rename_session(&mut self, id: &str, title: &str) -> bool {
        self.registry.rename(&SessionId::new(id), title).is_ok()
    }

    /// Remove a session; the registry recreates an empty one when the last
    /// is removed.
    pub fn remove_session(&mut self, id: &str) -> bool {
        let id = SessionId::new(id);
        if self.pending_session.as_ref() == Some(&id) {
            self.assistant.cancel();
            self.pending_session = None;
        }
        let was_active = self.registry.active_id() == &id;
        let ok = self.registry.remove(&id).is_ok();
        if ok && was_active {
            self.show_active_canvas();
        }
        ok
    }

    /// Chat transcript of the active session.
    pub fn transcript_json(&self) -> String {
        to_json(&self.registry.active().transcript)
    }

    // ─── Canvases ────────────────────────────────────────────────────────

    pub fn active_canvas_id(&self) -> String {
        self.registry.active().store.active_id().to_string()
    }

    /// Breadcrumb, root first: `[{id, title}]`.
    pub fn breadcrumb_json(&self) -> String {
        to_json(&self.registry.active().store.stack())
    }

    /// Depth-first canvas tree: `[{id, title, depth, anchor}]`.
    pub fn outline_json(&self) -> String {
        let list: Vec<Value> = self
            .registry
            .active()
            .store
            .outline()
            .into_iter()
            .map(|e| {
                json!({
                    "id": e.id,
                    "title": e.title,
                    "depth": e.depth,
                    "anchor": e.anchor,
                })
            })
            .collect();
        Value::Array(list).to_string()
    }

    pub fn switch_canvas(&mut self, id: &str) -> bool {
        let ok = self.store_mut().switch_to(CanvasId::intern(id)).is_ok();
        if ok {
            self.show_active_canvas();
        }
        ok
    }

    /// Pop one breadcrumb level.
    pub fn back(&mut self) -> bool {
        let ok = self.store_mut().back();
        if ok {
            self.show_active_canvas();
        }
        ok
    }

    /// Open the child canvas of a node on the active canvas, if any.
    pub fn enter_node(&mut self, id: &str) -> bool {
        self.enter(AnchorTarget::Node(NodeId::intern(id)))
    }

    /// Open the child canvas of an edge on the active canvas, if any.
    pub fn enter_edge(&mut self, id: &str) -> bool {
        self.enter(AnchorTarget::Edge(EdgeId::intern(id)))
    }

    pub fn rename_canvas(&mut self, id: &str, title: &str) -> bool {
        self.store_mut().rename_canvas(CanvasId::intern(id), title).is_ok()
    }

    /// Delete a canvas and its descendants. Returns the removed ids as JSON;
    /// deleting the root only clears it.
    pub fn delete_canvas(&mut self, id: &str) -> String {
        let before = self.registry.active().store.active_id();
        match self.store_mut().delete_canvas(CanvasId::intern(id)) {
            Ok(removed) => {
                if self.registry.active().store.active_id() != before || id == before.as_str() {
                    self.show_active_canvas();
                } else {
                    self.selection = Selection::default();
                }
                to_json(&removed)
            }
            Err(err) => error_json(err),
        }
    }

    // ─── Geometry ────────────────────────────────────────────────────────

    /// Active canvas for the renderer: nodes with resolved boxes, edges with
    /// their segment endpoints. Dangling edges are left out.
    pub fn graph_json(&self) -> String {
        let canvas = self.registry.active().store.active();
        let edges: Vec<Value> = canvas
            .resolved_edges()
            .map(|(e, line)| {
                json!({
                    "id": e.id,
                    "source": e.source,
                    "target": e.target,
                    "name": e.name,
                    "summary": e.summary,
                    "x1": line.p0.x,
                    "y1": line.p0.y,
                    "x2": line.p1.x,
                    "y2": line.p1.y,
                    "hasChild": self.registry.active().store.child_of_active(AnchorTarget::Edge(e.id)).is_some(),
                })
            })
            .collect();
        let nodes: Vec<Value> = canvas
            .nodes
            .iter()
            .map(|n| {
                json!({
                    "id": n.id,
                    "label": n.label,
                    "name": n.name,
                    "summary": n.summary,
                    "important": n.important,
                    "x": n.x,
                    "y": n.y,
                    "w": n.width,
                    "h": n.height,
                    "hasChild": self.registry.active().store.child_of_active(AnchorTarget::Node(n.id)).is_some(),
                })
            })
            .collect();
        json!({ "canvas": canvas.id, "nodes": nodes, "edges": edges }).to_string()
    }

    /// Apply a renderer write-back (`move_node`, `resize_node`,
    /// `measured_size`, `rename_edge`).
    pub fn apply_edit(&mut self, json: &str) -> bool {
        match serde_json::from_str::<Edit>(json) {
            Ok(edit) => apply_edit(self.store_mut(), edit),
            Err(err) => {
                log::warn!("rejected edit: {err}");
                false
            }
        }
    }

    // ─── Viewport ────────────────────────────────────────────────────────

    pub fn resize(&mut self, width: f64, height: f64) {
        self.viewport.set_view_size(Size::new(width, height));
    }

    /// Returns `true` when the event moved the view.
    pub fn handle_pointer_down(&mut self, x: f64, y: f64, button: i16, time_ms: f64) -> bool {
        self.viewport
            .handle(&InputEvent::from_pointer_down(x, y, button, time_ms))
    }

    pub fn handle_pointer_move(&mut self, x: f64, y: f64) -> bool {
        self.viewport.handle(&InputEvent::from_pointer_move(x, y))
    }

    pub fn handle_pointer_up(&mut self, x: f64, y: f64, button: i16) -> bool {
        self.viewport.handle(&InputEvent::from_pointer_up(x, y, button))
    }

    pub fn handle_wheel(&mut self, x: f64, y: f64, delta_y: f64) -> bool {
        self.viewport.handle(&InputEvent::Wheel { x, y, delta_y })
    }

    /// Advance momentum and zoom animations. Returns whether another frame
    /// is needed.
    pub fn tick(&mut self, dt_ms: f64) -> bool {
        self.viewport.tick(dt_ms)
    }

    pub fn reset_view(&mut self) {
        self.viewport.reset();
    }

    /// Center the active canvas content in the view.
    pub fn fit_view(&mut self) -> bool {
        let (Some(bounds), Some(size)) = (
            self.registry.active().store.active().bounds(),
            self.viewport.view_size(),
        ) else {
            return false;
        };
        self.viewport.center_on(bounds, size);
        true
    }

    /// `{tx, ty, scale}`.
    pub fn view_json(&self) -> String {
        to_json(&self.viewport.state())
    }

    /// Canvas-to-screen transform as `[a, b, c, d, e, f]`.
    pub fn matrix(&self) -> Vec<f64> {
        self.viewport.matrix().as_coeffs().to_vec()
    }

    // ─── Selection ───────────────────────────────────────────────────────

    /// Select whatever lies under a screen point: a node first, then an
    /// edge. Returns the new selection.
    pub fn select_at(&mut self, x: f64, y: f64) -> String {
        let p = self.viewport.to_canvas_point(Point::new(x, y));
        let canvas = self.registry.active().store.active();
        let tolerance = EDGE_PICK_PX / self.viewport.state().scale;
        self.selection = match hit_test(canvas, p) {
            Some(id) => Selection::node(id),
            None => hit_test_edge(canvas, p, tolerance).map_or_else(Selection::default, Selection::edge),
        };
        to_json(&self.selection)
    }

    /// Marquee selection between two screen corners.
    pub fn select_rect(&mut self, x0: f64, y0: f64, x1: f64, y1: f64) -> String {
        let a = self.viewport.to_canvas_point(Point::new(x0, y0));
        let b = self.viewport.to_canvas_point(Point::new(x1, y1));
        self.selection = select_in_rect(self.registry.active().store.active(), a, b);
        to_json(&self.selection)
    }

    pub fn set_selection(&mut self, json: &str) -> bool {
        match serde_json::from_str(json) {
            Ok(selection) => {
                self.selection = selection;
                true
            }
            Err(_) => false,
        }
    }

    pub fn selection_json(&self) -> String {
        to_json(&self.selection)
    }

    pub fn clear_selection(&mut self) {
        self.selection = Selection::default();
    }

    // ─── AI exchange ─────────────────────────────────────────────────────

    pub fn is_busy(&self) -> bool {
        self.assistant.is_busy()
    }

    /// Record a user message and return the request JSON for the host to
    /// send to its collaborator.
    pub fn begin_request(&mut self, message: &str) -> String {
        let session = self.registry.active_mut();
        let id = session.id.clone();
        match self
            .assistant
            .begin(session, &self.selection, message, chrono::Utc::now())
        {
            Ok(request) => {
                self.pending_session = Some(id);
                to_json(&request)
            }
            Err(err) => error_json(err),
        }
    }

    /// Start an explain request for a node (`kind = "node"`) or an edge.
    pub fn begin_explain(&mut self, kind: &str, id: &str) -> String {
        let target = match kind {
            "node" => AnchorTarget::Node(NodeId::intern(id)),
            "edge" => AnchorTarget::Edge(EdgeId::intern(id)),
            other => return error_json(format!("unknown target kind `{other}`")),
        };
        let session = self.registry.active_mut();
        let sid = session.id.clone();
        match self.assistant.begin_explain(session, target, chrono::Utc::now()) {
            Ok(request) => {
                self.pending_session = Some(sid);
                to_json(&request)
            }
            Err(err) => error_json(err),
        }
    }

    /// Finish the outstanding request with the collaborator's raw response.
    pub fn complete_request(&mut self, response_json: &str) -> String {
        self.finish(AiResponse::from_json(response_json))
    }

    /// Finish the outstanding request as failed; the local stub answers.
    pub fn fail_request(&mut self, reason: &str) -> String {
        self.finish(Err(CollabError::Failed(reason.to_string())))
    }

    /// Answer a message with the local stub only.
    pub fn ask_stub(&mut self, message: &str) -> String {
        if self.assistant.is_busy() {
            return error_json(CollabError::Busy);
        }
        let session = self.registry.active_mut();
        match self.assistant.send(
            session,
            &self.selection,
            message,
            &mut StubCollaborator,
            chrono::Utc::now(),
        ) {
            Ok(exchange) => {
                self.selection = Selection::default();
                to_json(&exchange)
            }
            Err(err) => error_json(err),
        }
    }

    pub fn cancel_request(&mut self) {
        self.assistant.cancel();
        self.pending_session = None;
    }

    // ─── Snapshots ───────────────────────────────────────────────────────

    pub fn export_json(&self) -> String {
        RegistrySnapshot::capture(&self.registry)
            .to_json()
            .unwrap_or_else(error_json)
    }

    pub fn import_json(&mut self, json: &str) -> bool {
        self.import(RegistrySnapshot::from_json(json))
    }

    pub fn export_msgpack(&self) -> Vec<u8> {
        match RegistrySnapshot::capture(&self.registry).to_msgpack() {
            Ok(bytes) => bytes,
            Err(err) => {
                log::error!("msgpack export failed: {err}");
                Vec::new()
            }
        }
    }

    pub fn import_msgpack(&mut self, bytes: &[u8]) -> bool {
        self.import(RegistrySnapshot::from_msgpack(bytes))
    }
}

impl MindCanvas {
    fn store_mut(&mut self) -> &mut mg_core::store::CanvasStore {
        &mut self.registry.active_mut().store
    }

    fn enter(&mut self, target: AnchorTarget) -> bool {
        let ok = self.store_mut().enter_anchor(target).is_some();
        if ok {
            self.show_active_canvas();
        }
        ok
    }

    /// Fresh view and selection for a newly shown canvas: default zoom,
    /// content centered when there is any.
    fn show_active_canvas(&mut self) {
        self.selection = Selection::default();
        self.viewport.reset();
        self.fit_view();
    }

    fn finish(&mut self, outcome: Result<AiResponse, CollabError>) -> String {
        let Some(sid) = self.pending_session.take() else {
            return error_json(CollabError::Idle);
        };
        let Some(session) = self.registry.get_mut(&sid) else {
            self.assistant.cancel();
            return error_json(format!("session `{sid}` no longer exists"));
        };
        match self.assistant.complete(session, outcome, chrono::Utc::now()) {
            Ok(exchange) => {
                if exchange.report.switched_to.is_some() && self.registry.active_id() == &sid {
                    self.show_active_canvas();
                }
                to_json(&exchange)
            }
            Err(err) => error_json(err),
        }
    }

    fn import(&mut self, snapshot: Result<RegistrySnapshot, mg_core::snapshot::SnapshotError>) -> bool {
        match snapshot.and_then(RegistrySnapshot::restore) {
            Ok(registry) => {
                self.cancel_request();
                self.registry = registry;
                self.show_active_canvas();
                true
            }
            Err(err) => {
                log::warn!("import failed: {err}");
                false
            }
        }
    }
}

/// Route panics and `log` records to the browser console. Later calls only
/// adjust the level.
fn init_console(level: log::Level) {
    #[cfg(target_arch = "wasm32")]
    {
        console_error_panic_hook::set_once();
        if console_log::init_with_level(level).is_err() {
            log::debug!("console logger already installed");
        }
    }
    log::set_max_level(level.to_level_filter());
}
