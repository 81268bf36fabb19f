// THEORY:
// The `pipeline` module is the top-level API of the motion-event engine. It owns the
// one long-lived piece of state (the background model manager) and runs every frame
// through the same fixed sequence of stages:
//
//   downscale -> observe -> maybe refresh -> difference & mask -> outer contours
//             -> filter / grow / merge -> evict
//
// Frames are processed strictly one at a time. Nothing is carried from one frame to
// the next except the background window, its derived model, and whether the last
// frame saw any motion (which drives the optional quiet-scene refresh).

use crate::core_modules::background::{BackgroundModel, BackgroundModelManager, BackgroundStatistic};
use crate::core_modules::box_processor::{BoxPostProcessor, MergePolicy};
use crate::core_modules::foreground::{ImageprocExtractor, ShapeExtractor};
use crate::core_modules::frame::Frame;
use crate::core_modules::source::FrameSource;
use anyhow::{bail, Context, Result};
use image::GrayImage;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::ControlFlow;
use std::path::Path;
use std::time::{Duration, Instant};

// Re-export key data structures for the public API.
pub use crate::core_modules::rect::{Point, Rect, Shape};

/// Tunable behaviour of the detection pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Frames needed before the first background exists; also the steady-state window size.
    pub warmup_frames: usize,
    /// Minimum seconds between background rebuilds.
    pub refresh_interval_secs: f64,
    /// Shorter rebuild interval used while the previous frame had no motion events.
    pub quiet_refresh_interval_secs: Option<f64>,
    pub background_statistic: BackgroundStatistic,
    /// Mask pixels strictly above this value are foreground.
    pub threshold: u8,
    /// Side of the square structuring element used for the closing step.
    pub close_kernel_size: u32,
    /// Pixels added on every side of each admitted box.
    pub grow_margin: i32,
    /// Boxes whose top edge lies above this row are dropped.
    pub min_top_y: i32,
    /// Boxes smaller than this many pixels are dropped. Zero disables the check.
    pub min_area: i64,
    pub merge_policy: MergePolicy,
    /// Integer factor incoming frames are reduced by.
    pub downscale_factor: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            warmup_frames: 10,
            refresh_interval_secs: 45.0,
            quiet_refresh_interval_secs: None,
            background_statistic: BackgroundStatistic::Mean,
            threshold: 125,
            close_kernel_size: 3,
            grow_margin: 3,
            min_top_y: 20,
            min_area: 0,
            merge_policy: MergePolicy::SinglePass,
            downscale_factor: 2,
        }
    }
}

impl PipelineConfig {
    /// Loads a JSON config. Missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: Self = serde_json::from_str(&text)
            .with_context(|| format!("parsing config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.warmup_frames == 0 {
            bail!("warmup_frames must be at least 1");
        }
        check_interval("refresh_interval_secs", self.refresh_interval_secs)?;
        if let Some(quiet) = self.quiet_refresh_interval_secs {
            check_interval("quiet_refresh_interval_secs", quiet)?;
        }
        if self.close_kernel_size % 2 == 0 || self.close_kernel_size > MAX_CLOSE_KERNEL_SIZE {
            bail!(
                "close_kernel_size must be odd and at most {MAX_CLOSE_KERNEL_SIZE}, got {}",
                self.close_kernel_size
            );
        }
        if !(0..=MAX_GROW_MARGIN).contains(&self.grow_margin) {
            bail!("grow_margin must be between 0 and {MAX_GROW_MARGIN}, got {}", self.grow_margin);
        }
        if self.min_area < 0 {
            bail!("min_area must not be negative, got {}", self.min_area);
        }
        if self.downscale_factor == 0 {
            bail!("downscale_factor must be at least 1");
        }
        Ok(())
    }

    /// The refresh interval. Out-of-range values saturate instead of failing; see [`validate`](Self::validate).
    pub fn refresh_interval(&self) -> Duration {
        saturating_interval(self.refresh_interval_secs)
    }

    pub fn quiet_refresh_interval(&self) -> Option<Duration> {
        self.quiet_refresh_interval_secs.map(saturating_interval)
    }
}

/// Largest side `imageproc` square masks support.
const MAX_CLOSE_KERNEL_SIZE: u32 = 2 * u8::MAX as u32 + 1;
/// Keeps grown boxes well inside `i32` for any frame size.
const MAX_GROW_MARGIN: i32 = i32::MAX / 4;

fn check_interval(name: &str, secs: f64) -> Result<()> {
    Duration::try_from_secs_f64(secs)
        .map(|_| ())
        .map_err(|e| anyhow::anyhow!("{name} must be a non-negative number of seconds, got {secs}: {e}"))
}

fn saturating_interval(secs: f64) -> Duration {
    if secs.is_nan() || secs <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
}

/// The detailed result of a frame that went through detection.
#[derive(Debug, Clone)]
pub struct DetectionData {
    /// The frame as processed, after downscaling. Event coordinates refer to it.
    pub frame: Frame,
    /// Binary foreground mask, same size as `frame`.
    pub mask: GrayImage,
    /// Final filtered, grown and merged boxes.
    pub events: Vec<Rect>,
    /// Whether the background was rebuilt while processing this frame.
    pub background_refreshed: bool,
}

/// The output of the pipeline for a single frame.
#[derive(Debug, Clone)]
pub enum Report {
    /// The frame had no pixels or the wrong size and was skipped.
    Unusable,
    /// No background exists yet; detection was not attempted.
    Warming,
    Detection(DetectionData),
}

impl Report {
    /// The frame's motion events. Empty unless detection ran.
    pub fn events(&self) -> &[Rect] {
        match self {
            Report::Detection(data) => &data.events,
            _ => &[],
        }
    }

    pub fn mask(&self) -> Option<&GrayImage> {
        match self {
            Report::Detection(data) => Some(&data.mask),
            _ => None,
        }
    }

    pub fn has_motion(&self) -> bool {
        !self.events().is_empty()
    }
}

/// Counters and the per-frame event record of a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    pub frames: u64,
    pub unusable_frames: u64,
    pub warming_frames: u64,
    pub frames_with_motion: u64,
    /// Events of every frame that went through detection, keyed by frame index.
    pub events: BTreeMap<u64, Vec<Rect>>,
}

impl RunSummary {
    pub fn record(&mut self, frame_index: u64, report: &Report) {
        self.frames += 1;
        match report {
            Report::Unusable => self.unusable_frames += 1,
            Report::Warming => self.warming_frames += 1,
            Report::Detection(data) => {
                if !data.events.is_empty() {
                    self.frames_with_motion += 1;
                }
                self.events.insert(frame_index, data.events.clone());
            }
        }
    }
}

/// The motion-event engine.
pub struct DetectionPipeline<E: ShapeExtractor = ImageprocExtractor> {
    config: PipelineConfig,
    background: BackgroundModelManager,
    box_processor: BoxPostProcessor,
    extractor: E,
    frames_seen: u64,
    /// Whether the last detected frame produced no events.
    scene_quiet: bool,
}

impl DetectionPipeline<ImageprocExtractor> {
    pub fn new(config: PipelineConfig) -> Self {
        Self::with_extractor(config, ImageprocExtractor)
    }
}

impl<E: ShapeExtractor> DetectionPipeline<E> {
    pub fn with_extractor(config: PipelineConfig, extractor: E) -> Self {
        let background = BackgroundModelManager::new(
            config.warmup_frames,
            config.refresh_interval(),
            config.background_statistic,
        );
        let box_processor = BoxPostProcessor::from_config(&config);
        Self {
            config,
            background,
            box_processor,
            extractor,
            frames_seen: 0,
            scene_quiet: false,
        }
    }

    /// Replaces the box post-processor, e.g. to install a custom admission predicate.
    pub fn with_box_processor(mut self, box_processor: BoxPostProcessor) -> Self {
        self.box_processor = box_processor;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn background(&self) -> Option<&BackgroundModel> {
        self.background.current_background()
    }

    pub fn background_manager(&self) -> &BackgroundModelManager {
        &self.background
    }

    /// Number of frames handed to [`process_frame`](Self::process_frame) so far.
    pub fn frames_seen(&self) -> u64 {
        self.frames_seen
    }

    /// Runs one frame through every stage.
    pub fn process_frame(&mut self, frame: Frame, now: Instant) -> Report {
        self.frames_seen += 1;

        // Stage 0: Bring the frame to working resolution.
        let frame = frame.downscale(self.config.downscale_factor);

        // Stage 1: Background window upkeep.
        if !self.background.observe(frame.clone(), now) {
            return Report::Unusable;
        }
        let interval = match self.config.quiet_refresh_interval() {
            Some(quiet) if self.scene_quiet => quiet,
            _ => self.config.refresh_interval(),
        };
        let background_refreshed = self.background.maybe_refresh_after(now, interval);

        // Stage 2: Nothing to compare against until warm.
        let Some(background) = self.background.current_background() else {
            return Report::Warming;
        };

        // Stage 3: Foreground mask.
        let mask = self.extractor.difference_and_mask(
            frame.image(),
            background.image(),
            self.config.close_kernel_size,
            self.config.threshold,
        );

        // Stage 4: Raw shapes.
        let shapes = self.extractor.extract_outer_contours(&mask);

        // Stage 5: Filter, grow, merge.
        let events = self.box_processor.process(&shapes);

        // Stage 6: Keep the window at its target size.
        self.background.evict_oldest();

        debug!(
            "frame {}: {} shapes -> {} events",
            self.frames_seen,
            shapes.len(),
            events.len()
        );
        self.scene_quiet = events.is_empty();

        Report::Detection(DetectionData {
            frame,
            mask,
            events,
            background_refreshed,
        })
    }

    /// Pulls frames from `source` until it ends or `on_report` breaks.
    ///
    /// `on_report` receives the 1-based frame index with each report.
    pub fn run<S, F>(&mut self, source: &mut S, mut on_report: F) -> Result<RunSummary>
    where
        S: FrameSource + ?Sized,
        F: FnMut(u64, &Report) -> ControlFlow<()>,
    {
        let mut summary = RunSummary::default();

        while let Some(frame) = source.next_frame()? {
            let report = self.process_frame(frame, Instant::now());
            let index = self.frames_seen;
            summary.record(index, &report);

            if on_report(index, &report).is_break() {
                break;
            }
        }

        Ok(summary)
    }
}
