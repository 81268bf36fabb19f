// THEORY:
// `ParallelPipeline` splits capture from detection. Capture is a blocking pull, so it
// runs on tokio's blocking pool and hands frames to the detection side through a
// bounded single-producer/single-consumer channel. The consumer owns the
// `DetectionPipeline`, and with it the background window, for the whole run; the
// capture side never sees either. Detection is per-pixel work too, so each frame is
// processed on the blocking pool as well: the pipeline is moved into the blocking
// task and handed back with the report, keeping the async worker free.
//
// Frames are timestamped when captured rather than when dequeued, so background
// refresh timing follows the camera's clock even if detection falls behind. The
// bounded channel applies backpressure: a slow consumer stalls capture instead of
// buffering without limit. Dropping the receiver (end of run or an early stop)
// makes the next send fail, which ends the capture task.

use crate::core_modules::frame::Frame;
use crate::core_modules::source::FrameSource;
use crate::pipeline::{DetectionPipeline, PipelineConfig, Report, RunSummary};
use anyhow::{Context, Result};
use log::{debug, info};
use std::ops::ControlFlow;
use std::time::Instant;
use tokio::sync::mpsc;

const DEFAULT_CHANNEL_CAPACITY: usize = 4;

/// A frame as handed from the capture task to the detection side.
#[derive(Debug, Clone)]
pub struct CapturedFrame {
    pub frame: Frame,
    pub frame_id: u64,
    pub captured_at: Instant,
}

/// Capture on a blocking task, detection on the caller's task.
pub struct ParallelPipeline {
    config: PipelineConfig,
    channel_capacity: usize,
}

impl ParallelPipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }

    /// Frames allowed in flight between capture and detection.
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }

    /// Runs until the source ends or `on_report` breaks.
    ///
    /// `on_report` receives the capture-side frame id (1-based) with each report.
    pub async fn run<S, F>(&self, source: S, mut on_report: F) -> Result<RunSummary>
    where
        S: FrameSource + Send + 'static,
        F: FnMut(u64, &Report) -> ControlFlow<()>,
    {
        let (frame_tx, mut frame_rx) = mpsc::channel::<CapturedFrame>(self.channel_capacity);
        let producer = tokio::task::spawn_blocking(move || capture_loop(source, frame_tx));

        let mut pipeline = DetectionPipeline::new(self.config.clone());
        let mut summary = RunSummary::default();

        while let Some(captured) = frame_rx.recv().await {
            let frame_id = captured.frame_id;
            let (returned, report) = tokio::task::spawn_blocking(move || {
                let report = pipeline.process_frame(captured.frame, captured.captured_at);
                (pipeline, report)
            })
            .await
            .context("detection task panicked")?;
            pipeline = returned;
            summary.record(frame_id, &report);

            if on_report(frame_id, &report).is_break() {
                debug!("detection stopped at frame {frame_id}");
                break;
            }
        }

        // Unblocks a producer waiting on a full channel.
        drop(frame_rx);
        let captured = producer.await.context("capture task panicked")??;
        info!(
            "captured {captured} frames, processed {} ({} with motion)",
            summary.frames, summary.frames_with_motion
        );

        Ok(summary)
    }
}

fn capture_loop<S: FrameSource>(mut source: S, frame_tx: mpsc::Sender<CapturedFrame>) -> Result<u64> {
    let mut frame_id = 0;

    while let Some(frame) = source.next_frame()? {
        frame_id += 1;
        let captured = CapturedFrame {
            frame,
            frame_id,
            captured_at: Instant::now(),
        };
        if frame_tx.blocking_send(captured).is_err() {
            // Receiver gone: the detection side has stopped.
            break;
        }
    }

    Ok(frame_id)
}
