//! Collision-avoiding placement for new nodes.
//!
//! Three tiers, first success wins:
//!
//! 1. **Ring search**: concentric rings around the desired point.
//! 2. **Repulsion relaxation**: push the point away from crowded centers,
//!    then ring-search around the relaxed point.
//! 3. **Grid fallback**: scan a fixed grid; if every cell collides, return
//!    the grid origin and accept the overlap.
//!
//! Work is bounded: 2 × 96 ring candidates, a fixed number of relaxation
//! iterations and `grid_cells²` grid cells.

use crate::geometry::{collides_with_any, node_rect};
use kurbo::{Point, Rect, Size, Vec2};
use serde::{Deserialize, Serialize};

// ─── Config ───────────────────────────────────────────────────────────────

/// Tunables of the placement engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PlacementConfig {
    /// Minimum clearance between node rectangles.
    pub gap: f64,
    /// Ring radii, searched in order. Radius 0 tests the desired point itself.
    pub ring_radii: Vec<f64>,
    /// Angular samples per ring (12 = every 30°).
    pub ring_samples: u32,
    /// Relaxation iterations.
    pub relax_iterations: u32,
    /// Repulsion constant `k` in `k / d²`.
    pub repulsion: f64,
    /// Distance clamp for the repulsion force.
    pub min_distance: f64,
    /// Top-left of the fallback grid.
    pub grid_origin: (f64, f64),
    /// Grid is `grid_cells × grid_cells`, scanned row-major.
    pub grid_cells: u32,
}

impl Default for PlacementConfig {
    fn default() -> Self {
        Self {
            gap: 50.0,
            ring_radii: vec![0.0, 20.0, 40.0, 60.0, 80.0, 100.0, 140.0, 180.0],
            ring_samples: 12,
            relax_iterations: 20,
            repulsion: 100.0,
            min_distance: 1.0,
            grid_origin: (80.0, 80.0),
            grid_cells: 60,
        }
    }
}

// ─── Result ───────────────────────────────────────────────────────────────

/// Which tier produced a placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlacementTier {
    Ring,
    Relaxed,
    Grid,
    /// Every grid cell collided; the position overlaps existing geometry.
    Exhausted,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    /// Top-left corner of the placed rectangle.
    pub position: Point,
    pub tier: PlacementTier,
}

// ─── Engine ───────────────────────────────────────────────────────────────

/// Find a top-left position for a `size` rectangle near `desired` that
/// collides with none of `existing`.
pub fn place(existing: &[Rect], desired: Point, size: Size, config: &PlacementConfig) -> Placement {
    if let Some(position) = ring_search(existing, desired, size, config) {
        log::trace!("placed at ring candidate {position:?}");
        return Placement {
            position,
            tier: PlacementTier::Ring,
        };
    }

    let relaxed = relax(existing, desired, config);
    if let Some(position) = ring_search(existing, relaxed, size, config) {
        log::trace!("placed after relaxation {desired:?} -> {position:?}");
        return Placement {
            position,
            tier: PlacementTier::Relaxed,
        };
    }

    match grid_search(existing, size, config) {
        Some(position) => {
            log::trace!("placed on grid at {position:?}");
            Placement {
                position,
                tier: PlacementTier::Grid,
            }
        }
        None => {
            let (ox, oy) = config.grid_origin;
            log::warn!("placement grid exhausted, overlapping at origin");
            Placement {
                position: Point::new(ox, oy),
                tier: PlacementTier::Exhausted,
            }
        }
    }
}

/// Sample rings around `center`, returning the first free candidate.
fn ring_search(existing: &[Rect], center: Point, size: Size, config: &PlacementConfig) -> Option<Point> {
    let samples = config.ring_samples.max(1);
    let step = std::f64::consts::TAU / f64::from(samples);

    for &radius in &config.ring_radii {
        // Every sample of the zero ring is the center itself.
        let count = if radius == 0.0 { 1 } else { samples };
        for k in 0..count {
            let angle = step * f64::from(k);
            let candidate = Point::new(center.x + angle.cos() * radius, center.y + angle.sin() * radius);
            let rect = node_rect(candidate.x, candidate.y, size.width, size.height);
            if !collides_with_any(rect, existing, config.gap) {
                return Some(candidate);
            }
        }
    }
    None
}

/// Push `start` away from every rectangle center with an inverse-square force.
fn relax(existing: &[Rect], start: Point, config: &PlacementConfig) -> Point {
    let mut p = start;
    for _ in 0..config.relax_iterations {
        for rect in existing {
            let delta: Vec2 = p - rect.center();
            let d = delta.hypot().max(config.min_distance);
            let force = config.repulsion / (d * d);
            p += delta / d * force;
        }
    }
    p
}

/// Row-major scan of the fallback grid.
fn grid_search(existing: &[Rect], size: Size, config: &PlacementConfig) -> Option<Point> {
    let (ox, oy) = config.grid_origin;
    let step_x = size.width + config.gap;
    let step_y = size.height + config.gap;

    for row in 0..config.grid_cells {
        for col in 0..config.grid_cells {
            let x = ox + f64::from(col) * step_x;
            let y = oy + f64::from(row) * step_y;
            if !collides_with_any(node_rect(x, y, size.width, size.height), existing, config.gap) {
                return Some(Point::new(x, y));
            }
        }
    }
    None
}
