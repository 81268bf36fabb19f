// THEORY:
// This module is the seam between the motion-event core and the commodity image
// operations it depends on. The core only needs two things from an image library:
// a binary foreground mask for a frame against its background, and the outermost
// outlines of the connected regions in that mask. `ShapeExtractor` names exactly
// those two operations so the pipeline can be driven by any backend, including a
// scripted one in tests.
//
// `ImageprocExtractor` is the stock backend built on `image` and `imageproc`:
//   absolute difference -> luma reduction -> grayscale closing -> binary threshold
//   -> outer-border contour tracing.

use crate::core_modules::rect::{Point, Shape};
use image::{imageops, GrayImage, Luma, Rgb, RgbImage};
use imageproc::contours::{find_contours, BorderType};
use imageproc::contrast::{self, ThresholdType};
use imageproc::map::map_colors2;
use imageproc::morphology::{grayscale_close, Mask};

/// The image-processing collaborators the detection pipeline calls into.
pub trait ShapeExtractor {
    /// Binary foreground mask (0 or 255) of `frame` against `background`.
    ///
    /// The mask has the same dimensions as `frame`.
    fn difference_and_mask(
        &self,
        frame: &RgbImage,
        background: &RgbImage,
        close_kernel_size: u32,
        threshold: u8,
    ) -> GrayImage;

    /// One outline per connected foreground region, outermost borders only.
    fn extract_outer_contours(&self, mask: &GrayImage) -> Vec<Shape>;
}

/// [`ShapeExtractor`] implemented with `image` and `imageproc`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageprocExtractor;

impl ShapeExtractor for ImageprocExtractor {
    fn difference_and_mask(
        &self,
        frame: &RgbImage,
        background: &RgbImage,
        close_kernel_size: u32,
        threshold: u8,
    ) -> GrayImage {
        let gray = absolute_difference_luma(frame, background);
        let closed = close(&gray, close_kernel_size);
        binarize(&closed, threshold)
    }

    fn extract_outer_contours(&self, mask: &GrayImage) -> Vec<Shape> {
        find_contours::<i32>(mask)
            .into_iter()
            .filter(|contour| contour.border_type == BorderType::Outer && contour.parent.is_none())
            .map(|contour| {
                contour
                    .points
                    .into_iter()
                    .map(|point| Point::new(point.x, point.y))
                    .collect()
            })
            .collect()
    }
}

/// Per-channel absolute difference reduced to a single luma channel.
///
/// Pixels outside `background` (mismatched sizes) compare against black.
pub fn absolute_difference_luma(frame: &RgbImage, background: &RgbImage) -> GrayImage {
    let padded;
    let background = if background.dimensions() == frame.dimensions() {
        background
    } else {
        let mut canvas = RgbImage::new(frame.width(), frame.height());
        imageops::replace(&mut canvas, background, 0, 0);
        padded = canvas;
        &padded
    };

    map_colors2(frame, background, |a: Rgb<u8>, b: Rgb<u8>| {
        let diff = |channel: usize| a.0[channel].abs_diff(b.0[channel]) as u32;
        // Rec. 601 weights in fixed point, rounded.
        let luma = (diff(0) * 299 + diff(1) * 587 + diff(2) * 114 + 500) / 1000;
        Luma([luma as u8])
    })
}

/// Grayscale morphological closing with a `size`x`size` square element.
///
/// `size` is clamped to the largest odd side `imageproc` masks support.
pub fn close(image: &GrayImage, size: u32) -> GrayImage {
    let radius = (size / 2).min(u8::MAX as u32) as u8;
    grayscale_close(image, &Mask::square(radius))
}

/// Every pixel strictly above `threshold` becomes 255, every other pixel 0.
pub fn binarize(image: &GrayImage, threshold: u8) -> GrayImage {
    contrast::threshold(image, threshold, ThresholdType::Binary)
}
