// THEORY:
// `Rect` is the value type every other stage of the box post-processor speaks. It is
// a plain axis-aligned rectangle with an integer origin and size, nothing more: no
// identity, no history, created fresh for every frame and thrown away afterwards.
//
// Key architectural principles:
// 1.  **Pure Functions**: Every operation here (containment, overlap, union, growth,
//     ordering) is a pure function of its inputs. There is no state to manage.
// 2.  **Signed Coordinates**: Growth can push a rectangle past the frame edge, so the
//     origin is signed. Width and height stay non-negative by construction.
// 3.  **Sweep-Aware Overlap**: The overlap test used by the merge sweep is deliberately
//     one-directional on the x axis. It is only meaningful when the caller guarantees
//     `self.x <= other.x`, which the x-sorted sweep does.

use serde::{Deserialize, Serialize};

/// A single integer point, as produced by the contour extractor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// The outline of one connected foreground region.
pub type Shape = Vec<Point>;

/// An axis-aligned rectangle with an integer origin and size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Rect {
    /// Left edge.
    pub x: i32,
    /// Top edge.
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// The minimal axis-aligned rectangle enclosing every point of `shape`.
    ///
    /// Follows the pixel-inclusive convention of contour bounding boxes: a single
    /// point yields a 1x1 rectangle. Returns `None` for an empty shape.
    pub fn bounding(shape: &[Point]) -> Option<Self> {
        let first = shape.first()?;
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);

        for point in &shape[1..] {
            min_x = min_x.min(point.x);
            min_y = min_y.min(point.y);
            max_x = max_x.max(point.x);
            max_y = max_y.max(point.y);
        }

        Some(Self::new(min_x, min_y, max_x - min_x + 1, max_y - min_y + 1))
    }

    /// x coordinate of the right edge.
    pub fn right(&self) -> i32 {
        self.x.saturating_add(self.width)
    }

    /// y coordinate of the bottom edge.
    pub fn bottom(&self) -> i32 {
        self.y.saturating_add(self.height)
    }

    pub fn area(&self) -> i64 {
        self.width as i64 * self.height as i64
    }

    /// Whether `other` lies entirely within `self`.
    pub fn contains(&self, other: &Rect) -> bool {
        self.x <= other.x
            && self.y <= other.y
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }

    /// Whether the vertical spans of the two rectangles touch.
    ///
    /// Either rectangle's top or bottom edge falling inside the other's closed
    /// vertical span counts as touching.
    pub fn vertical_spans_touch(&self, other: &Rect) -> bool {
        let within = |value: i32, rect: &Rect| (rect.y..=rect.bottom()).contains(&value);

        within(other.y, self)
            || within(other.bottom(), self)
            || within(self.y, other)
            || within(self.bottom(), other)
    }

    /// The overlap test of the merge sweep.
    ///
    /// Only `other.x` is checked against `self`'s horizontal span, so the result is
    /// meaningful only when `self.x <= other.x`. Equal x coordinates degenerate
    /// correctly: `other.x == self.x` is always inside the span.
    pub fn x_sorted_overlaps(&self, other: &Rect) -> bool {
        (self.x..=self.right()).contains(&other.x) && self.vertical_spans_touch(other)
    }

    /// Order-independent overlap test: the closed rectangles share at least one point.
    pub fn overlaps(&self, other: &Rect) -> bool {
        let (left, right) = if self.x <= other.x {
            (self, other)
        } else {
            (other, self)
        };
        left.x_sorted_overlaps(right)
    }

    /// The smallest rectangle covering both `self` and `other`.
    pub fn union(&self, other: &Rect) -> Rect {
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        let right = self.right().max(other.right());
        let bottom = self.bottom().max(other.bottom());
        Rect::new(x, y, right.saturating_sub(x), bottom.saturating_sub(y))
    }

    /// Expands the rectangle by `margin` on all four sides.
    ///
    /// Coordinates saturate at the `i32` range.
    pub fn grow(&self, margin: i32) -> Rect {
        Rect::new(
            self.x.saturating_sub(margin),
            self.y.saturating_sub(margin),
            self.width.saturating_add(margin.saturating_mul(2)),
            self.height.saturating_add(margin.saturating_mul(2)),
        )
    }
}

/// Stable ascending sort by left edge.
pub fn sort_by_x(rects: &mut [Rect]) {
    rects.sort_by_key(|rect| rect.x);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounding_covers_every_point() {
        let shape = vec![Point::new(3, 4), Point::new(7, 2), Point::new(5, 9)];
        assert_eq!(Rect::bounding(&shape), Some(Rect::new(3, 2, 5, 8)));
    }

    #[test]
    fn bounding_of_single_point_is_one_pixel() {
        assert_eq!(Rect::bounding(&[Point::new(4, 4)]), Some(Rect::new(4, 4, 1, 1)));
        assert_eq!(Rect::bounding(&[]), None);
    }

    #[test]
    fn growth_expands_symmetrically() {
        assert_eq!(Rect::new(10, 10, 5, 5).grow(3), Rect::new(7, 7, 11, 11));
    }

    #[test]
    fn oversized_growth_saturates() {
        let grown = Rect::new(10, 10, 5, 5).grow(i32::MAX / 2 + 1);
        assert_eq!(grown.x, 10 - (i32::MAX / 2 + 1));
        assert_eq!(grown.width, i32::MAX);
        assert_eq!(grown.right(), grown.x + i32::MAX);
        assert_eq!(grown.union(&Rect::new(0, 0, 1, 1)), grown);
    }

    #[test]
    fn union_spans_far_corners() {
        let a = Rect::new(0, 0, 10, 10);
        let b = Rect::new(5, 5, 10, 10);
        assert_eq!(a.union(&b), Rect::new(0, 0, 15, 15));
        assert_eq!(b.union(&a), Rect::new(0, 0, 15, 15));
    }

    #[test]
    fn containment() {
        let outer = Rect::new(0, 0, 10, 10);
        assert!(outer.contains(&Rect::new(2, 2, 3, 3)));
        assert!(outer.contains(&outer));
        assert!(!outer.contains(&Rect::new(8, 8, 3, 3)));
    }

    #[test]
    fn sorted_overlap_requires_both_axes() {
        let a = Rect::new(0, 0, 10, 10);
        assert!(a.x_sorted_overlaps(&Rect::new(5, 5, 10, 10)));
        // Horizontal span matches, vertical does not.
        assert!(!a.x_sorted_overlaps(&Rect::new(5, 20, 3, 3)));
        // Vertical span matches, horizontal does not.
        assert!(!a.x_sorted_overlaps(&Rect::new(11, 0, 3, 3)));
        // Touching edges count.
        assert!(a.x_sorted_overlaps(&Rect::new(10, 10, 2, 2)));
    }

    #[test]
    fn vertical_containment_in_either_direction_touches() {
        let tall = Rect::new(0, 0, 4, 20);
        let short = Rect::new(2, 5, 4, 2);
        assert!(tall.x_sorted_overlaps(&short));
        let short_first = Rect::new(0, 5, 4, 2);
        let tall_second = Rect::new(2, 0, 4, 20);
        assert!(short_first.x_sorted_overlaps(&tall_second));
    }

    #[test]
    fn equal_x_is_well_defined() {
        let a = Rect::new(4, 0, 0, 5);
        let b = Rect::new(4, 3, 2, 2);
        assert!(a.x_sorted_overlaps(&b));
        assert!(b.x_sorted_overlaps(&a));
    }

    #[test]
    fn symmetric_overlap_ignores_argument_order() {
        let a = Rect::new(5, 5, 10, 10);
        let b = Rect::new(0, 0, 10, 10);
        assert!(!b.x_sorted_overlaps(&Rect::new(11, 0, 1, 1)));
        assert!(a.overlaps(&b));
        assert!(b.overlaps(&a));
    }

    #[test]
    fn sort_is_stable_on_equal_x() {
        let mut rects = vec![
            Rect::new(5, 1, 1, 1),
            Rect::new(0, 0, 1, 1),
            Rect::new(5, 0, 1, 1),
        ];
        sort_by_x(&mut rects);
        assert_eq!(
            rects,
            vec![
                Rect::new(0, 0, 1, 1),
                Rect::new(5, 1, 1, 1),
                Rect::new(5, 0, 1, 1),
            ]
        );
    }
}
