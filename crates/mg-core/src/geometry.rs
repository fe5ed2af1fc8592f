//! Collision oracle for node rectangles.
//!
//! Rectangles are axis-aligned `kurbo::Rect`s in canvas space. Two
//! rectangles "overlap" when they come closer than `gap` on both axes.

use kurbo::{Point, Rect, Size};

/// Build a node rectangle from its top-left corner and size.
pub fn node_rect(x: f64, y: f64, width: f64, height: f64) -> Rect {
    Rect::from_origin_size(Point::new(x, y), Size::new(width, height))
}

/// True iff `a` and `b`, separated by less than `gap`, intersect.
///
/// Separation test: there is no overlap when one rectangle's far edge plus
/// the gap reaches no further than the other's near edge, on either axis.
pub fn overlaps(a: Rect, b: Rect, gap: f64) -> bool {
    !(a.x1 + gap <= b.x0 || b.x1 + gap <= a.x0 || a.y1 + gap <= b.y0 || b.y1 + gap <= a.y0)
}

/// True iff `candidate` overlaps any rectangle in `existing`.
pub fn collides_with_any(candidate: Rect, existing: &[Rect], gap: f64) -> bool {
    existing.iter().any(|r| overlaps(candidate, *r, gap))
}

/// Union bounding box of a set of rectangles, `None` when empty.
pub fn bounds_of(rects: impl IntoIterator<Item = Rect>) -> Option<Rect> {
    rects.into_iter().reduce(|acc, r| acc.union(r))
}
