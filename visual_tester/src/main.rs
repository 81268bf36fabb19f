use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use motion_events::core_modules::background::BackgroundStatistic;
use motion_events::core_modules::box_processor::MergePolicy;
use motion_events::core_modules::utils::image_helper::image_helper::{annotate, save_mask, save_rgb, EVENT_COLOR};
use motion_events::parallel_pipeline::ParallelPipeline;
use motion_events::pipeline::RunSummary;
use motion_events::{DetectionPipeline, FrameSource, ImageSequenceSource, PipelineConfig, Report};
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "visual_tester", about = "Runs the motion-event pipeline over a frame sequence or video")]
struct Args {
    /// Directory of still frames (read in file-name order), or a video file with the `video` feature
    input: PathBuf,
    /// JSON pipeline configuration; missing fields take their defaults
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    #[arg(long)]
    warmup_frames: Option<usize>,
    #[arg(long, value_name = "SECONDS")]
    refresh_interval: Option<f64>,
    /// Shorter refresh interval used while the scene is quiet
    #[arg(long, value_name = "SECONDS")]
    quiet_refresh_interval: Option<f64>,
    #[arg(long)]
    threshold: Option<u8>,
    #[arg(long)]
    grow_margin: Option<i32>,
    #[arg(long)]
    min_top_y: Option<i32>,
    #[arg(long)]
    min_area: Option<i64>,
    #[arg(long)]
    downscale: Option<u32>,
    /// Median instead of mean background
    #[arg(long)]
    median: bool,
    /// Merge boxes until no two overlap
    #[arg(long)]
    fixed_point: bool,
    /// Capture on a separate thread
    #[arg(long)]
    parallel: bool,
    /// Stop after this many frames
    #[arg(long)]
    max_frames: Option<u64>,
    /// Write annotated frames and masks here
    #[arg(long, value_name = "DIR")]
    output_dir: Option<PathBuf>,
    /// Write the per-frame event record here instead of stdout
    #[arg(long, value_name = "PATH")]
    events_json: Option<PathBuf>,
}

impl Args {
    fn pipeline_config(&self) -> Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::from_json_file(path)?,
            None => PipelineConfig::default(),
        };

        if let Some(frames) = self.warmup_frames {
            config.warmup_frames = frames;
        }
        if let Some(secs) = self.refresh_interval {
            config.refresh_interval_secs = secs;
        }
        if let Some(secs) = self.quiet_refresh_interval {
            config.quiet_refresh_interval_secs = Some(secs);
        }
        if let Some(threshold) = self.threshold {
            config.threshold = threshold;
        }
        if let Some(margin) = self.grow_margin {
            config.grow_margin = margin;
        }
        if let Some(y) = self.min_top_y {
            config.min_top_y = y;
        }
        if let Some(area) = self.min_area {
            config.min_area = area;
        }
        if let Some(factor) = self.downscale {
            config.downscale_factor = factor;
        }
        if self.median {
            config.background_statistic = BackgroundStatistic::Median;
        }
        if self.fixed_point {
            config.merge_policy = MergePolicy::FixedPoint;
        }

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    // --- 1. Argument Parsing & Setup ---
    let args = Args::parse();
    let config = args.pipeline_config()?;
    info!("pipeline config: {config:?}");

    if let Some(dir) = &args.output_dir {
        std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }

    // --- 2. Frame Source ---
    let source = open_source(&args.input)?;

    // --- 3. Processing Loop ---
    let mut sink = FrameSink::new(args.output_dir.clone(), args.max_frames);
    let summary = if args.parallel {
        ParallelPipeline::new(config)
            .run(source, |index, report| sink.accept(index, report))
            .await?
    } else {
        let mut source = source;
        DetectionPipeline::new(config).run(&mut source, |index, report| sink.accept(index, report))?
    };
    sink.finish()?;

    // --- 4. Event Record ---
    write_events(&summary, args.events_json.as_deref())?;
    info!(
        "processed {} frames: {} warming, {} unusable, {} with motion",
        summary.frames, summary.warming_frames, summary.unusable_frames, summary.frames_with_motion
    );

    Ok(())
}

fn open_source(input: &Path) -> Result<Box<dyn FrameSource + Send>> {
    if input.is_dir() {
        let source = ImageSequenceSource::open(input)?;
        info!("reading {} frames from {}", source.remaining(), input.display());
        return Ok(Box::new(source));
    }

    #[cfg(feature = "video")]
    return Ok(Box::new(video::VideoSource::open(input)?));

    #[cfg(not(feature = "video"))]
    anyhow::bail!(
        "{} is not a directory; build with `--features video` to read video files",
        input.display()
    );
}

/// Writes per-frame artifacts and enforces the frame limit.
struct FrameSink {
    output_dir: Option<PathBuf>,
    max_frames: Option<u64>,
    error: Option<anyhow::Error>,
}

impl FrameSink {
    fn new(output_dir: Option<PathBuf>, max_frames: Option<u64>) -> Self {
        Self {
            output_dir,
            max_frames,
            error: None,
        }
    }

    fn accept(&mut self, index: u64, report: &Report) -> ControlFlow<()> {
        if let Err(e) = self.save(index, report) {
            self.error = Some(e);
            return ControlFlow::Break(());
        }
        if self.max_frames.is_some_and(|max| index >= max) {
            return ControlFlow::Break(());
        }
        ControlFlow::Continue(())
    }

    fn save(&self, index: u64, report: &Report) -> Result<()> {
        let (Some(dir), Report::Detection(data)) = (&self.output_dir, report) else {
            return Ok(());
        };

        let annotated = annotate(data.frame.image(), &data.events, EVENT_COLOR);
        save_rgb(dir.join(format!("frame_{index:06}.png")), &annotated)?;
        save_mask(dir.join(format!("mask_{index:06}.png")), &data.mask)?;
        Ok(())
    }

    /// Surfaces the first write failure, if any.
    fn finish(self) -> Result<()> {
        match self.error {
            Some(e) => Err(e.context("writing frame output")),
            None => Ok(()),
        }
    }
}

fn write_events(summary: &RunSummary, path: Option<&Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(&summary.events)?;
    match path {
        Some(path) => {
            std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
            info!("event record saved to {}", path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}

#[cfg(feature = "video")]
mod video {
    use anyhow::{bail, Result};
    use motion_events::{Frame, FrameSource};
    use opencv::{
        imgproc,
        prelude::*,
        videoio::{self, VideoCapture},
    };
    use std::path::Path;

    /// Frames decoded by OpenCV, converted from BGR.
    pub struct VideoSource {
        cap: VideoCapture,
    }

    impl VideoSource {
        pub fn open(path: &Path) -> Result<Self> {
            let cap = VideoCapture::from_file(&path.to_string_lossy(), videoio::CAP_ANY)?;
            if !cap.is_opened()? {
                bail!("could not open video {}", path.display());
            }
            Ok(Self { cap })
        }
    }

    impl FrameSource for VideoSource {
        fn next_frame(&mut self) -> Result<Option<Frame>> {
            let mut frame = Mat::default();
            if !self.cap.read(&mut frame)? {
                return Ok(None);
            }
            if frame.empty() {
                return Ok(Some(Frame::empty()));
            }

            // Convert the OpenCV Mat (BGR) to an RGB buffer for our pipeline.
            let mut rgb_frame = Mat::default();
            imgproc::cvt_color(&frame, &mut rgb_frame, imgproc::COLOR_BGR2RGB, 0)?;
            let bytes = rgb_frame.data_bytes()?.to_vec();

            Ok(Some(
                Frame::from_rgb(rgb_frame.cols() as u32, rgb_frame.rows() as u32, bytes)
                    .unwrap_or_else(Frame::empty),
            ))
        }
    }
}
