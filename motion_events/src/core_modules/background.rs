// THEORY:
// The `BackgroundModelManager` owns the pipeline's only long-lived state: a sliding
// window of the most recent frames and the background image derived from it.
//
// Key architectural principles:
// 1.  **Warm-Up, Then Slide**: The window grows until it holds `warmup_frames`
//     frames. From then on the pipeline pushes one frame and evicts one frame per
//     processed frame, so the window is pinned at that size between frames.
// 2.  **Recompute, Don't Blend**: The background is rebuilt from scratch over the
//     whole window rather than updated with an exponential average. Every frame in
//     the window weighs the same and the background is never older than the refresh
//     interval plus the window span.
// 3.  **Gated Refresh**: Rebuilding costs one pass over every pixel of every window
//     frame, so it only happens once the refresh interval has strictly elapsed since
//     the last rebuild. The very first rebuild happens as soon as the window is warm.
// 4.  **Wide Accumulation**: Per-channel sums are accumulated in `u32` so that no
//     realistic window size can overflow, then rounded back to 8 bits.
// 5.  **Guarded Input**: Zero-area frames and frames whose size differs from the
//     session's first frame never enter the window.

use crate::core_modules::frame::Frame;
use image::RgbImage;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// The per-pixel statistic used to collapse the window into one image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BackgroundStatistic {
    /// Arithmetic mean of every frame, rounded to the nearest 8-bit value.
    #[default]
    Mean,
    /// Per-channel median. Even counts average the two middle values, truncated.
    Median,
}

/// A background image plus the instant it was computed.
#[derive(Debug, Clone)]
pub struct BackgroundModel {
    image: RgbImage,
    captured_at: Instant,
    frame_count: usize,
}

impl BackgroundModel {
    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn captured_at(&self) -> Instant {
        self.captured_at
    }

    /// How many window frames went into this model.
    pub fn frame_count(&self) -> usize {
        self.frame_count
    }
}

/// FIFO of timestamped frames.
#[derive(Debug, Default)]
pub struct FrameWindow {
    frames: VecDeque<(Instant, Frame)>,
}

impl FrameWindow {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            frames: VecDeque::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, observed_at: Instant, frame: Frame) {
        self.frames.push_back((observed_at, frame));
    }

    pub fn pop_oldest(&mut self) -> Option<Frame> {
        self.frames.pop_front().map(|(_, frame)| frame)
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn frames(&self) -> impl Iterator<Item = &Frame> {
        self.frames.iter().map(|(_, frame)| frame)
    }

    /// Time between the oldest and the newest frame in the window.
    pub fn span(&self) -> Duration {
        match (self.frames.front(), self.frames.back()) {
            (Some((oldest, _)), Some((newest, _))) => newest.saturating_duration_since(*oldest),
            _ => Duration::ZERO,
        }
    }
}

/// Owns the frame window and the background derived from it.
pub struct BackgroundModelManager {
    /// The window size that marks the end of warm-up.
    warmup_frames: usize,
    /// Minimum time between two background rebuilds.
    refresh_interval: Duration,
    statistic: BackgroundStatistic,
    window: FrameWindow,
    /// Fixed by the first accepted frame.
    dimensions: Option<(u32, u32)>,
    model: Option<BackgroundModel>,
    warm_announced: bool,
}

impl BackgroundModelManager {
    pub fn new(warmup_frames: usize, refresh_interval: Duration, statistic: BackgroundStatistic) -> Self {
        let warmup_frames = warmup_frames.max(1);
        Self {
            warmup_frames,
            refresh_interval,
            statistic,
            window: FrameWindow::with_capacity(warmup_frames + 1),
            dimensions: None,
            model: None,
            warm_announced: false,
        }
    }

    /// Appends `frame` to the window.
    ///
    /// Returns `false`, leaving the window untouched, if the frame is unusable or its
    /// dimensions differ from the first accepted frame.
    pub fn observe(&mut self, frame: Frame, now: Instant) -> bool {
        if !frame.is_usable() {
            warn!("skipping zero-area frame ({}x{})", frame.width(), frame.height());
            return false;
        }

        match self.dimensions {
            Some(expected) if expected != frame.dimensions() => {
                warn!(
                    "skipping frame of size {:?}, session frames are {:?}",
                    frame.dimensions(),
                    expected
                );
                return false;
            }
            Some(_) => {}
            None => self.dimensions = Some(frame.dimensions()),
        }

        self.window.push(now, frame);

        if self.is_warm() && !self.warm_announced {
            self.warm_announced = true;
            info!("background window warm after {} frames", self.window.len());
        }
        true
    }

    /// Whether the window has reached its target size.
    pub fn is_warm(&self) -> bool {
        self.window.len() >= self.warmup_frames
    }

    /// Rebuilds the background if warm and the refresh interval has elapsed.
    pub fn maybe_refresh(&mut self, now: Instant) -> bool {
        self.maybe_refresh_after(now, self.refresh_interval)
    }

    /// Like [`maybe_refresh`](Self::maybe_refresh) with an explicit interval for this call.
    pub fn maybe_refresh_after(&mut self, now: Instant, interval: Duration) -> bool {
        if !self.is_warm() {
            return false;
        }

        if let Some(model) = &self.model {
            if now.saturating_duration_since(model.captured_at) <= interval {
                return false;
            }
        }

        let Some(image) = self.compute() else {
            return false;
        };

        info!(
            "background refreshed from {} frames spanning {:?}",
            self.window.len(),
            self.window.span()
        );
        self.model = Some(BackgroundModel {
            image,
            captured_at: now,
            frame_count: self.window.len(),
        });
        true
    }

    /// The last computed background, if any.
    pub fn current_background(&self) -> Option<&BackgroundModel> {
        self.model.as_ref()
    }

    /// Drops the oldest frame once the window holds more than its target size.
    pub fn evict_oldest(&mut self) -> bool {
        if self.window.len() > self.warmup_frames {
            self.window.pop_oldest();
            debug!("evicted oldest background frame");
            true
        } else {
            false
        }
    }

    pub fn window_len(&self) -> usize {
        self.window.len()
    }

    fn compute(&self) -> Option<RgbImage> {
        if self.window.is_empty() {
            return None;
        }
        let (width, height) = self.dimensions?;
        let raw = match self.statistic {
            BackgroundStatistic::Mean => self.mean(),
            BackgroundStatistic::Median => self.median(),
        };
        RgbImage::from_raw(width, height, raw)
    }

    fn mean(&self) -> Vec<u8> {
        let count = self.window.len() as u32;
        let Some(first) = self.window.frames().next() else {
            return Vec::new();
        };

        let mut sums = vec![0u32; first.image().as_raw().len()];
        for frame in self.window.frames() {
            for (sum, &value) in sums.iter_mut().zip(frame.image().as_raw()) {
                *sum += value as u32;
            }
        }

        sums.into_iter()
            .map(|sum| ((sum + count / 2) / count) as u8)
            .collect()
    }

    fn median(&self) -> Vec<u8> {
        let frames: Vec<&[u8]> = self.window.frames().map(|f| f.image().as_raw().as_slice()).collect();
        let Some(first) = frames.first() else {
            return Vec::new();
        };

        let mut samples = Vec::with_capacity(frames.len());
        (0..first.len())
            .map(|index| {
                samples.clear();
                samples.extend(frames.iter().map(|raw| raw[index]));
                samples.sort_unstable();
                let mid = samples.len() / 2;
                if samples.len() % 2 == 1 {
                    samples[mid]
                } else {
                    ((samples[mid - 1] as u16 + samples[mid] as u16) / 2) as u8
                }
            })
            .collect()
    }
}
