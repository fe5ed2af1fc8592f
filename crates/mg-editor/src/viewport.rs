//! Viewport engine: pan, momentum, eased zoom-to-point and reset.
//!
//! The engine owns a `{tx, ty, scale}` transform (screen = canvas · scale +
//! translation) and an explicit animation state advanced by [`tick`]. It
//! never draws; renderers read [`ViewportEngine::matrix`].
//!
//! [`tick`]: ViewportEngine::tick

use crate::input::{InputEvent, PointerButton};
use kurbo::{Affine, Point, Rect, Size, Vec2};
use serde::{Deserialize, Serialize};

// ─── State & config ──────────────────────────────────────────────────────

/// The view transform.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewState {
    pub tx: f64,
    pub ty: f64,
    pub scale: f64,
}

impl Default for ViewState {
    fn default() -> Self {
        Self {
            tx: 0.0,
            ty: 0.0,
            scale: 1.0,
        }
    }
}

impl ViewState {
    pub fn to_canvas_point(&self, screen: Point) -> Point {
        Point::new((screen.x - self.tx) / self.scale, (screen.y - self.ty) / self.scale)
    }

    pub fn to_screen_point(&self, canvas: Point) -> Point {
        Point::new(canvas.x * self.scale + self.tx, canvas.y * self.scale + self.ty)
    }

    /// Canvas → screen transform: translate after scale.
    pub fn matrix(&self) -> Affine {
        Affine::translate(Vec2::new(self.tx, self.ty)) * Affine::scale(self.scale)
    }
}

/// Where wheel zoom is anchored when driven through [`ViewportEngine::handle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZoomAnchor {
    /// Center of the view (falls back to the cursor while the view size is
    /// unknown).
    #[default]
    ViewCenter,
    Cursor,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ViewportConfig {
    pub min_scale: f64,
    pub max_scale: f64,
    /// Momentum velocity multiplier per frame.
    pub decay: f64,
    /// Momentum stops once both velocity components fall below this.
    pub stop_speed: f64,
    /// Wheel delta → `exp(-delta · sensitivity)` zoom factor.
    pub zoom_sensitivity: f64,
    pub zoom_duration_ms: f64,
    /// Two pan presses closer than this reset the view.
    pub double_press_ms: f64,
    pub frame_ms: f64,
    pub pan_button: PointerButton,
    pub zoom_anchor: ZoomAnchor,
}

impl Default for ViewportConfig {
    fn default() -> Self {
        Self {
            min_scale: 0.1,
            max_scale: 10.0,
            decay: 0.92,
            stop_speed: 0.5,
            zoom_sensitivity: 0.0006,
            zoom_duration_ms: 240.0,
            double_press_ms: 300.0,
            frame_ms: 1000.0 / 60.0,
            pan_button: PointerButton::Middle,
            zoom_anchor: ZoomAnchor::ViewCenter,
        }
    }
}

// ─── Animation state ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
struct PanGesture {
    origin: Point,
    start_tx: f64,
    start_ty: f64,
    last: Point,
    velocity: Vec2,
}

#[derive(Debug, Clone, Copy)]
struct Momentum {
    velocity: Vec2,
    /// Time not yet consumed by whole frames.
    carry_ms: f64,
}

#[derive(Debug, Clone, Copy)]
struct ZoomAnimation {
    token: u64,
    anchor: Point,
    from: ViewState,
    target_scale: f64,
    elapsed_ms: f64,
}

fn ease_out_cubic(t: f64) -> f64 {
    let t = t.clamp(0.0, 1.0);
    1.0 - (1.0 - t).powi(3)
}

// ─── Engine ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct ViewportEngine {
    state: ViewState,
    config: ViewportConfig,
    view_size: Option<Size>,
    pan: Option<PanGesture>,
    momentum: Option<Momentum>,
    zoom: Option<ZoomAnimation>,
    zoom_token: u64,
    last_pan_press: Option<f64>,
}

impl ViewportEngine {
    pub fn new(config: ViewportConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn state(&self) -> ViewState {
        self.state
    }

    pub fn config(&self) -> &ViewportConfig {
        &self.config
    }

    pub fn matrix(&self) -> Affine {
        self.state.matrix()
    }

    pub fn to_canvas_point(&self, screen: Point) -> Point {
        self.state.to_canvas_point(screen)
    }

    pub fn to_screen_point(&self, canvas: Point) -> Point {
        self.state.to_screen_point(canvas)
    }

    pub fn set_view_size(&mut self, size: Size) {
        self.view_size = Some(size);
    }

    pub fn view_size(&self) -> Option<Size> {
        self.view_size
    }

    pub fn is_panning(&self) -> bool {
        self.pan.is_some()
    }

    pub fn is_animating(&self) -> bool {
        self.momentum.is_some() || self.zoom.is_some()
    }

    /// Identity transform, all gestures and animations cancelled.
    pub fn reset(&mut self) {
        self.state = ViewState::default();
        self.pan = None;
        self.momentum = None;
        self.zoom = None;
    }

    /// Translate so that `bounds` (canvas space) is centered in a view of
    /// `view_size`, keeping the current scale.
    pub fn center_on(&mut self, bounds: Rect, view_size: Size) {
        self.view_size = Some(view_size);
        self.momentum = None;
        self.zoom = None;
        let c = bounds.center();
        self.state.tx = view_size.width / 2.0 - c.x * self.state.scale;
        self.state.ty = view_size.height / 2.0 - c.y * self.state.scale;
    }

    // ─── Pan ─────────────────────────────────────────────────────────────

    /// Start a pan gesture at `screen`. Cancels momentum and zoom; a press
    /// within the double-press window of the previous one resets the view
    /// first.
    pub fn begin_pan(&mut self, screen: Point, time_ms: f64) {
        self.momentum = None;
        self.zoom = None;
        if self
            .last_pan_press
            .is_some_and(|prev| time_ms - prev < self.config.double_press_ms)
        {
            log::debug!("double pan press, resetting view");
            self.state = ViewState::default();
        }
        self.last_pan_press = Some(time_ms);
        self.pan = Some(PanGesture {
            origin: screen,
            start_tx: self.state.tx,
            start_ty: self.state.ty,
            last: screen,
            velocity: Vec2::ZERO,
        });
    }

    /// Drag the pan gesture to `screen`. Returns `false` when not panning.
    pub fn pan_to(&mut self, screen: Point) -> bool {
        let Some(pan) = self.pan.as_mut() else {
            return false;
        };
        self.state.tx = pan.start_tx + (screen.x - pan.origin.x);
        self.state.ty = pan.start_ty + (screen.y - pan.origin.y);
        pan.velocity = screen - pan.last;
        pan.last = screen;
        true
    }

    /// Finish the pan gesture and coast with its last sampled velocity.
    pub fn end_pan(&mut self) -> bool {
        match self.pan.take() {
            Some(pan) => {
                self.start_momentum(pan.velocity);
                true
            }
            None => false,
        }
    }

    /// Finish any pan gesture and coast with an explicit velocity
    /// (pixels per frame).
    pub fn release_pan(&mut self, velocity: Vec2) {
        self.pan = None;
        self.start_momentum(velocity);
    }

    fn start_momentum(&mut self, velocity: Vec2) {
        self.momentum = Some(Momentum {
            velocity,
            carry_ms: 0.0,
        });
    }

    // ─── Zoom ────────────────────────────────────────────────────────────

    /// Start an eased zoom keeping the canvas point under `anchor` fixed.
    /// Supersedes any zoom in flight and stops panning and momentum.
    /// Returns the animation token. Non-finite input is ignored and leaves
    /// the view and any zoom in flight untouched.
    pub fn zoom_at(&mut self, anchor: Point, wheel_delta: f64) -> u64 {
        if !wheel_delta.is_finite() || !anchor.is_finite() {
            log::debug!("ignoring zoom with delta {wheel_delta} at {anchor:?}");
            return self.zoom_token;
        }
        self.pan = None;
        self.momentum = None;
        let from = self.state;
        let factor = (-wheel_delta * self.config.zoom_sensitivity).exp();
        let target_scale = (from.scale * factor).clamp(self.config.min_scale, self.config.max_scale);

        self.zoom_token += 1;
        self.zoom = Some(ZoomAnimation {
            token: self.zoom_token,
            anchor,
            from,
            target_scale,
            elapsed_ms: 0.0,
        });
        log::trace!("zoom #{} to {target_scale:.3} at {anchor:?}", self.zoom_token);
        self.zoom_token
    }

    /// Token of the zoom animation in flight, if any.
    pub fn zoom_token(&self) -> Option<u64> {
        self.zoom.map(|z| z.token)
    }

    // ─── Frame ───────────────────────────────────────────────────────────

    /// Advance animations by `dt_ms`. Returns whether anything is still
    /// animating.
    pub fn tick(&mut self, dt_ms: f64) -> bool {
        let dt_ms = dt_ms.max(0.0);

        if let Some(mut zoom) = self.zoom {
            zoom.elapsed_ms += dt_ms;
            let p = if self.config.zoom_duration_ms > 0.0 {
                zoom.elapsed_ms / self.config.zoom_duration_ms
            } else {
                1.0
            };
            let k = ease_out_cubic(p);
            let s0 = zoom.from.scale;
            let s = s0 + (zoom.target_scale - s0) * k;
            self.state.scale = s;
            self.state.tx = zoom.anchor.x - (s / s0) * (zoom.anchor.x - zoom.from.tx);
            self.state.ty = zoom.anchor.y - (s / s0) * (zoom.anchor.y - zoom.from.ty);
            self.zoom = (p < 1.0).then_some(zoom);
        }

        if let Some(mut momentum) = self.momentum {
            momentum.carry_ms += dt_ms;
            let frame = self.config.frame_ms.max(f64::EPSILON);
            let mut running = true;
            while momentum.carry_ms >= frame {
                momentum.carry_ms -= frame;
                momentum.velocity *= self.config.decay;
                let v = momentum.velocity;
                if v.x.abs() < self.config.stop_speed && v.y.abs() < self.config.stop_speed {
                    running = false;
                    break;
                }
                self.state.tx += v.x;
                self.state.ty += v.y;
            }
            self.momentum = running.then_some(momentum);
        }

        self.is_animating()
    }

    // ─── Events ──────────────────────────────────────────────────────────

    /// Route a normalized input event. Returns whether the view was
    /// affected.
    pub fn handle(&mut self, event: &InputEvent) -> bool {
        match *event {
            InputEvent::PointerDown {
                x,
                y,
                button,
                time_ms,
            } if button == self.config.pan_button => {
                self.begin_pan(Point::new(x, y), time_ms);
                true
            }
            InputEvent::PointerMove { x, y } => self.pan_to(Point::new(x, y)),
            InputEvent::PointerUp { button, .. } if button == self.config.pan_button => self.end_pan(),
            InputEvent::Wheel { x, y, delta_y } => {
                let anchor = match (self.config.zoom_anchor, self.view_size) {
                    (ZoomAnchor::ViewCenter, Some(size)) => Point::new(size.width / 2.0, size.height / 2.0),
                    _ => Point::new(x, y),
                };
                self.zoom_at(anchor, delta_y);
                true
            }
            InputEvent::Frame { dt_ms } => {
                let was = self.is_animating();
                self.tick(dt_ms);
                was
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FRAME: f64 = 1000.0 / 60.0;

    fn settle(engine: &mut ViewportEngine) {
        for _ in 0..1000 {
            if !engine.tick(FRAME) {
                break;
            }
        }
    }

    #[test]
    fn canvas_screen_mapping_is_inverse() {
        let state = ViewState {
            tx: 30.0,
            ty: -12.0,
            scale: 2.5,
        };
        let p = Point::new(123.0, 45.0);
        let back = state.to_screen_point(state.to_canvas_point(p));
        assert!((back - p).hypot() < 1e-9);
        assert!((state.matrix() * state.to_canvas_point(p) - p).hypot() < 1e-9);
    }

    #[test]
    fn pan_follows_pointer() {
        let mut engine = ViewportEngine::default();
        engine.begin_pan(Point::new(100.0, 100.0), 0.0);
        engine.pan_to(Point::new(130.0, 90.0));
        assert_eq!(engine.state().tx, 30.0);
        assert_eq!(engine.state().ty, -10.0);
    }

    #[test]
    fn non_finite_wheel_delta_is_ignored() {
        let mut engine = ViewportEngine::default();
        let before = engine.state();
        for delta in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            engine.zoom_at(Point::new(50.0, 50.0), delta);
        }
        assert_eq!(engine.zoom_token(), None);
        settle(&mut engine);
        assert_eq!(engine.state(), before);
        assert!(engine.state().scale.is_finite());
    }

    #[test]
    fn pan_without_gesture_is_ignored() {
        let mut engine = ViewportEngine::default();
        assert!(!engine.pan_to(Point::new(10.0, 10.0)));
        assert!(!engine.end_pan());
        assert_eq!(engine.state(), ViewState::default());
    }

    #[test]
    fn momentum_increases_then_converges() {
        let mut engine = ViewportEngine::default();
        engine.release_pan(Vec2::new(10.0, 0.0));
        let mut last = engine.state().tx;
        let mut frames = 0;
        while engine.tick(FRAME) {
            let tx = engine.state().tx;
            assert!(tx > last);
            last = tx;
            frames += 1;
            assert!(frames < 200);
        }
        // Geometric series bounded by 10 · 0.92 / 0.08.
        assert!(last > 50.0 && last < 115.0);
        assert_eq!(engine.state().ty, 0.0);
    }

    #[test]
    fn momentum_uses_whole_frames() {
        let mut engine = ViewportEngine::default();
        engine.release_pan(Vec2::new(10.0, 0.0));
        engine.tick(FRAME / 2.0);
        assert_eq!(engine.state().tx, 0.0);
        engine.tick(FRAME / 2.0 + 1e-9);
        assert!((engine.state().tx - 9.2).abs() < 1e-9);
    }

    #[test]
    fn slow_release_stops_immediately() {
        let mut engine = ViewportEngine::default();
        engine.release_pan(Vec2::new(0.4, 0.3));
        assert!(!engine.tick(FRAME));
        assert_eq!(engine.state().tx, 0.0);
    }

    #[test]
    fn zoom_keeps_anchor_fixed() {
        let mut engine = ViewportEngine::default();
        engine.begin_pan(Point::ZERO, 0.0);
        engine.pan_to(Point::new(40.0, 25.0));
        engine.end_pan();
        engine.reset();

        let anchor = Point::new(300.0, 200.0);
        let before = engine.to_canvas_point(anchor);
        engine.zoom_at(anchor, -500.0);
        for _ in 0..5 {
            engine.tick(FRAME);
            let during = engine.to_canvas_point(anchor);
            assert!((during - before).hypot() < 1e-6);
        }
        settle(&mut engine);
        assert!((engine.state().scale - (0.3f64).exp()).abs() < 1e-9);
        assert!((engine.to_canvas_point(anchor) - before).hypot() < 1e-6);
    }

    #[test]
    fn zoom_is_clamped() {
        let mut engine = ViewportEngine::default();
        engine.zoom_at(Point::ZERO, -1e6);
        settle(&mut engine);
        assert_eq!(engine.state().scale, 10.0);
        engine.zoom_at(Point::ZERO, 1e6);
        settle(&mut engine);
        assert!((engine.state().scale - 0.1).abs() < 1e-12);
    }

    #[test]
    fn new_zoom_supersedes_old() {
        let mut engine = ViewportEngine::default();
        let first = engine.zoom_at(Point::ZERO, -100.0);
        engine.tick(FRAME);
        let second = engine.zoom_at(Point::ZERO, -100.0);
        assert!(second > first);
        assert_eq!(engine.zoom_token(), Some(second));
    }

    #[test]
    fn zoom_cancels_momentum_and_pan_cancels_zoom() {
        let mut engine = ViewportEngine::default();
        engine.release_pan(Vec2::new(10.0, 0.0));
        engine.zoom_at(Point::ZERO, -100.0);
        settle(&mut engine);
        assert_eq!(engine.state().tx, 0.0);

        engine.zoom_at(Point::ZERO, -100.0);
        engine.begin_pan(Point::ZERO, 0.0);
        assert!(!engine.is_animating());
    }

    #[test]
    fn double_press_resets_view() {
        let mut engine = ViewportEngine::default();
        engine.begin_pan(Point::ZERO, 1000.0);
        engine.pan_to(Point::new(50.0, 50.0));
        engine.end_pan();
        engine.begin_pan(Point::ZERO, 1200.0);
        assert_eq!(engine.state(), ViewState::default());

        engine.pan_to(Point::new(50.0, 50.0));
        engine.end_pan();
        engine.begin_pan(Point::ZERO, 2000.0);
        assert_eq!(engine.state().tx, 50.0);
    }

    #[test]
    fn center_on_bounds() {
        let mut engine = ViewportEngine::default();
        engine.center_on(Rect::new(0.0, 0.0, 200.0, 100.0), Size::new(800.0, 600.0));
        assert_eq!(engine.to_screen_point(Point::new(100.0, 50.0)), Point::new(400.0, 300.0));
    }

    #[test]
    fn handle_routes_pan_button_only() {
        let mut engine = ViewportEngine::default();
        assert!(!engine.handle(&InputEvent::from_pointer_down(0.0, 0.0, 0, 0.0)));
        assert!(engine.handle(&InputEvent::from_pointer_down(0.0, 0.0, 1, 0.0)));
        assert!(engine.handle(&InputEvent::from_pointer_move(20.0, 0.0)));
        assert!(engine.handle(&InputEvent::from_pointer_up(20.0, 0.0, 1)));
        assert_eq!(engine.state().tx, 20.0);
    }

    #[test]
    fn wheel_anchors_at_view_center_when_known() {
        let mut engine = ViewportEngine::default();
        engine.set_view_size(Size::new(800.0, 600.0));
        let center = Point::new(400.0, 300.0);
        let before = engine.to_canvas_point(center);
        engine.handle(&InputEvent::Wheel {
            x: 10.0,
            y: 10.0,
            delta_y: -200.0,
        });
        settle(&mut engine);
        assert!((engine.to_canvas_point(center) - before).hypot() < 1e-6);
    }
}
