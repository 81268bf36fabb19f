// THEORY:
// This file is the main entry point for the `motion_events` library crate.
// It exposes the `DetectionPipeline` (and its threaded sibling, `ParallelPipeline`)
// together with `PipelineConfig` and `Report` as the high-level interface: hand the
// pipeline a frame, receive that frame's foreground mask and its motion events.
//
// The building blocks under `core_modules` are public as well, so that callers can
// reuse the geometry and box post-processing on shapes from their own detectors, or
// swap in their own image-processing backend through `ShapeExtractor`.

pub mod core_modules;
pub mod parallel_pipeline;
pub mod pipeline;

pub use core_modules::frame::Frame;
pub use core_modules::source::{FrameSource, ImageSequenceSource, MemorySource};
pub use pipeline::{DetectionPipeline, PipelineConfig, Rect, Report};
