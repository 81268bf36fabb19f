use image::{Rgb, RgbImage};
use motion_events::core_modules::box_processor::MergePolicy;
use motion_events::{DetectionPipeline, Frame, MemorySource, PipelineConfig, Rect, Report};
use std::ops::ControlFlow;
use std::time::{Duration, Instant};

const WIDTH: u32 = 120;
const HEIGHT: u32 = 90;
const BACKDROP: [u8; 3] = [40, 60, 50];

fn backdrop() -> Frame {
    Frame::filled(WIDTH, HEIGHT, BACKDROP)
}

fn with_squares(squares: &[(u32, u32, u32)]) -> Frame {
    let mut image = RgbImage::from_pixel(WIDTH, HEIGHT, Rgb(BACKDROP));
    for &(x0, y0, size) in squares {
        for y in y0..y0 + size {
            for x in x0..x0 + size {
                image.put_pixel(x, y, Rgb([250, 250, 250]));
            }
        }
    }
    Frame::from_image(image)
}

fn exact_config() -> PipelineConfig {
    PipelineConfig {
        downscale_factor: 1,
        ..PipelineConfig::default()
    }
}

fn warm_up(pipeline: &mut DetectionPipeline, start: Instant) {
    for i in 0..pipeline.config().warmup_frames {
        let report = pipeline.process_frame(backdrop(), start + Duration::from_millis(i as u64 * 40));
        if i + 1 < pipeline.config().warmup_frames {
            assert!(matches!(report, Report::Warming));
        } else {
            assert!(matches!(report, Report::Detection(_)));
            assert!(!report.has_motion());
        }
    }
}

#[test]
fn a_bright_object_becomes_one_grown_event() {
    let start = Instant::now();
    let mut pipeline = DetectionPipeline::new(exact_config());
    warm_up(&mut pipeline, start);

    let report = pipeline.process_frame(with_squares(&[(50, 40, 8)]), start + Duration::from_secs(1));
    assert_eq!(report.events(), &[Rect::new(47, 37, 14, 14)]);

    let mask = report.mask().expect("detection ran");
    assert_eq!(mask.dimensions(), (WIDTH, HEIGHT));
    assert_eq!(mask.pixels().filter(|p| p.0[0] == 255).count(), 64);
}

#[test]
fn nearby_objects_merge_and_distant_ones_do_not() {
    let start = Instant::now();
    let mut pipeline = DetectionPipeline::new(exact_config());
    warm_up(&mut pipeline, start);

    // The first two are 4 px apart, within twice the growth margin.
    let frame = with_squares(&[(30, 40, 6), (40, 42, 6), (90, 60, 5)]);
    let report = pipeline.process_frame(frame, start + Duration::from_secs(1));

    assert_eq!(report.events(), &[Rect::new(27, 37, 22, 14), Rect::new(87, 57, 11, 11)]);
}

#[test]
fn objects_near_the_top_are_ignored() {
    let start = Instant::now();
    let mut pipeline = DetectionPipeline::new(exact_config());
    warm_up(&mut pipeline, start);

    let report = pipeline.process_frame(with_squares(&[(50, 5, 8)]), start + Duration::from_secs(1));
    assert!(matches!(report, Report::Detection(_)));
    assert!(report.events().is_empty());
}

#[test]
fn background_absorbs_a_parked_object_after_refresh() {
    let start = Instant::now();
    let config = PipelineConfig {
        warmup_frames: 3,
        refresh_interval_secs: 5.0,
        ..exact_config()
    };
    let mut pipeline = DetectionPipeline::new(config);
    for _ in 0..3 {
        pipeline.process_frame(backdrop(), start);
    }

    let parked = || with_squares(&[(60, 50, 10)]);
    let at = |secs: u64| start + Duration::from_secs(secs);

    assert!(pipeline.process_frame(parked(), at(1)).has_motion());
    assert!(pipeline.process_frame(parked(), at(2)).has_motion());
    assert!(pipeline.process_frame(parked(), at(3)).has_motion());

    // Window now holds only parked frames; the next refresh makes them background.
    let report = pipeline.process_frame(parked(), at(6));
    let Report::Detection(data) = report else {
        panic!("expected detection");
    };
    assert!(data.background_refreshed);
    assert!(data.events.is_empty());
}

#[test]
fn downscaled_detection_reports_in_working_coordinates() {
    let start = Instant::now();
    let mut pipeline = DetectionPipeline::new(PipelineConfig::default());
    let big = |squares: &[(u32, u32, u32)]| {
        let mut image = RgbImage::from_pixel(WIDTH * 2, HEIGHT * 2, Rgb(BACKDROP));
        for &(x0, y0, size) in squares {
            for y in y0..y0 + size {
                for x in x0..x0 + size {
                    image.put_pixel(x, y, Rgb([250, 250, 250]));
                }
            }
        }
        Frame::from_image(image)
    };

    for _ in 0..10 {
        pipeline.process_frame(big(&[]), start);
    }
    let report = pipeline.process_frame(big(&[(100, 80, 16)]), start + Duration::from_secs(1));

    assert_eq!(report.mask().map(|m| m.dimensions()), Some((WIDTH, HEIGHT)));
    assert_eq!(report.events().len(), 1);
    assert!(report.events()[0].contains(&Rect::new(51, 41, 6, 6)));
}

/// A wide bar, a tall bar starting just below its right half, and a small square
/// left of the tall bar. Only the grown boxes touch; the pixels are well apart.
fn chained_regions() -> Frame {
    let mut image = RgbImage::from_pixel(WIDTH, HEIGHT, Rgb(BACKDROP));
    let mut fill = |x0: u32, y0: u32, w: u32, h: u32| {
        for y in y0..y0 + h {
            for x in x0..x0 + w {
                image.put_pixel(x, y, Rgb([250, 250, 250]));
            }
        }
    };
    fill(20, 30, 40, 3);
    fill(50, 38, 3, 32);
    fill(30, 60, 4, 4);
    Frame::from_image(image)
}

#[test]
fn single_pass_leaves_chained_regions_partially_merged() {
    let start = Instant::now();
    let mut pipeline = DetectionPipeline::new(exact_config());
    warm_up(&mut pipeline, start);

    let report = pipeline.process_frame(chained_regions(), start + Duration::from_secs(1));
    assert_eq!(report.events(), &[Rect::new(17, 27, 46, 46), Rect::new(27, 57, 10, 10)]);
}

#[test]
fn fixed_point_policy_closes_chains() {
    let start = Instant::now();
    let config = PipelineConfig {
        merge_policy: MergePolicy::FixedPoint,
        ..exact_config()
    };
    let mut pipeline = DetectionPipeline::new(config);
    warm_up(&mut pipeline, start);

    let report = pipeline.process_frame(chained_regions(), start + Duration::from_secs(1));
    assert_eq!(report.events(), &[Rect::new(17, 27, 46, 46)]);
}

#[test]
fn full_run_over_a_memory_source() {
    let mut frames: Vec<Frame> = (0..10).map(|_| backdrop()).collect();
    frames.push(Frame::empty());
    frames.push(with_squares(&[(50, 40, 8)]));
    frames.push(backdrop());

    let mut pipeline = DetectionPipeline::new(exact_config());
    let summary = pipeline
        .run(&mut MemorySource::new(frames), |_, _| ControlFlow::Continue(()))
        .unwrap();

    assert_eq!(summary.frames, 13);
    assert_eq!(summary.warming_frames, 9);
    assert_eq!(summary.unusable_frames, 1);
    assert_eq!(summary.frames_with_motion, 1);
    assert_eq!(summary.events.get(&12), Some(&vec![Rect::new(47, 37, 14, 14)]));
    assert_eq!(summary.events.get(&13), Some(&Vec::new()));
}
