// THEORY:
// The `BoxPostProcessor` turns the raw outlines found in one frame's foreground mask
// into the frame's motion events. It is a stateless utility: every call to `process`
// starts from nothing and forgets everything when it returns.
//
// Stages, in order:
// 1.  **Bounding**: each outline becomes its minimal axis-aligned rectangle.
// 2.  **Admission**: a single boolean predicate over a rectangle decides whether it
//     is kept. The default rejects boxes whose top edge sits in the band near the
//     top of the frame (sky and ceiling flicker) and, optionally, tiny boxes.
// 3.  **Growth**: survivors are expanded by a fixed margin on every side, which
//     undoes edge erosion from thresholding and lets clustered boxes touch.
// 4.  **Merging**: a left-to-right sweep over the x-sorted boxes unions every pair
//     that overlaps. The sweep is a single pass, not a closure: once the cursor
//     leaves a box it is never looked at again, even if a later union would now
//     touch it. `MergePolicy::FixedPoint` repeats the sweep until nothing changes
//     for callers who want the closure instead.

use crate::core_modules::rect::{sort_by_x, Rect, Shape};
use crate::pipeline::PipelineConfig;
use serde::{Deserialize, Serialize};

/// How overlapping boxes are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MergePolicy {
    /// One x-sorted sweep. May leave chains of three or more boxes partially merged.
    #[default]
    SinglePass,
    /// Sweep repeatedly until a pass merges nothing.
    FixedPoint,
}

/// Predicate deciding whether a bounded rectangle is kept.
pub type Admission = Box<dyn Fn(&Rect) -> bool + Send + Sync>;

/// The default admission predicate: top edge at or below `min_top_y`, area at least `min_area`.
pub fn default_admission(min_top_y: i32, min_area: i64) -> Admission {
    Box::new(move |rect: &Rect| rect.y >= min_top_y && rect.area() >= min_area)
}

/// Filters, grows and merges one frame's raw shapes into its motion events.
pub struct BoxPostProcessor {
    admission: Admission,
    grow_margin: i32,
    merge_policy: MergePolicy,
}

impl BoxPostProcessor {
    pub fn new(min_top_y: i32, grow_margin: i32, merge_policy: MergePolicy) -> Self {
        Self {
            admission: default_admission(min_top_y, 0),
            grow_margin,
            merge_policy,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            admission: default_admission(config.min_top_y, config.min_area),
            grow_margin: config.grow_margin,
            merge_policy: config.merge_policy,
        }
    }

    /// Replaces the admission predicate.
    pub fn with_admission(mut self, admission: impl Fn(&Rect) -> bool + Send + Sync + 'static) -> Self {
        self.admission = Box::new(admission);
        self
    }

    /// Runs bounding, admission, growth and merging over one frame's shapes.
    pub fn process(&self, raw_shapes: &[Shape]) -> Vec<Rect> {
        let grown: Vec<Rect> = Self::bound(raw_shapes)
            .into_iter()
            .filter(|rect| self.admit(rect))
            .map(|rect| self.grow(&rect))
            .collect();

        self.merge(grown)
    }

    /// Minimal enclosing rectangle of every non-empty shape, in input order.
    pub fn bound(raw_shapes: &[Shape]) -> Vec<Rect> {
        raw_shapes
            .iter()
            .filter_map(|shape| Rect::bounding(shape))
            .collect()
    }

    pub fn admit(&self, rect: &Rect) -> bool {
        (self.admission)(rect)
    }

    pub fn grow(&self, rect: &Rect) -> Rect {
        rect.grow(self.grow_margin)
    }

    /// Merges according to the configured policy.
    pub fn merge(&self, rects: Vec<Rect>) -> Vec<Rect> {
        match self.merge_policy {
            MergePolicy::SinglePass => merge_single_pass(rects),
            MergePolicy::FixedPoint => merge_fixed_point(rects),
        }
    }
}

/// One left-to-right overlap-and-union pass over `rects` in the order given.
///
/// The caller is responsible for x-ordering; see [`merge_single_pass`]. Each box under
/// the outer cursor absorbs every later box it overlaps. Absorbed boxes are removed
/// in place and scanning resumes at the same index, so later boxes are checked
/// against the grown box. Boxes the cursor has already passed are never revisited.
pub fn sweep_merge(mut rects: Vec<Rect>) -> Vec<Rect> {
    let mut cursor = 0;

    while cursor < rects.len() {
        let mut current = rects[cursor];
        let mut candidate = cursor + 1;

        while candidate < rects.len() {
            if current.x_sorted_overlaps(&rects[candidate]) {
                current = current.union(&rects[candidate]);
                // Order-preserving removal; the next candidate shifts into this slot.
                rects.remove(candidate);
            } else {
                candidate += 1;
            }
        }

        rects[cursor] = current;
        cursor += 1;
    }

    rects
}

/// Stable x-sort followed by a single [`sweep_merge`].
pub fn merge_single_pass(mut rects: Vec<Rect>) -> Vec<Rect> {
    sort_by_x(&mut rects);
    sweep_merge(rects)
}

/// Repeats [`merge_single_pass`] until a pass performs no merge.
pub fn merge_fixed_point(rects: Vec<Rect>) -> Vec<Rect> {
    let mut current = merge_single_pass(rects);
    loop {
        let before = current.len();
        current = merge_single_pass(current);
        if current.len() == before {
            return current;
        }
    }
}
