// THEORY:
// A `Frame` is an immutable snapshot of one captured image. The capture source
// produces it, the pipeline only ever reads it, and the background window may keep
// a copy. The pixel buffer sits behind an `Arc` so that keeping that copy is a
// reference-count bump rather than a buffer clone.
//
// Frames arrive in whatever shape the capture source hands over (RGB, RGBA, decoded
// images), so this module is also where they are normalized to packed 8-bit RGB,
// checked for usability (zero-area reads happen on flaky sources) and reduced by
// the configured downscale factor before anything else looks at them.

use image::imageops::{self, FilterType};
use image::{DynamicImage, RgbImage};
use std::sync::Arc;

/// An immutable, cheaply clonable 8-bit RGB frame.
#[derive(Debug, Clone)]
pub struct Frame {
    image: Arc<RgbImage>,
}

impl Frame {
    pub fn from_image(image: RgbImage) -> Self {
        Self {
            image: Arc::new(image),
        }
    }

    pub fn from_dynamic(image: DynamicImage) -> Self {
        Self::from_image(image.to_rgb8())
    }

    /// Wraps a packed RGB buffer. Returns `None` if the length does not match the dimensions.
    pub fn from_rgb(width: u32, height: u32, bytes: Vec<u8>) -> Option<Self> {
        RgbImage::from_raw(width, height, bytes).map(Self::from_image)
    }

    /// Converts a packed RGBA buffer, dropping alpha.
    pub fn from_rgba(width: u32, height: u32, bytes: &[u8]) -> Option<Self> {
        if bytes.len() != (width as usize) * (height as usize) * 4 {
            return None;
        }
        let rgb: Vec<u8> = bytes
            .chunks_exact(4)
            .flat_map(|pixel| [pixel[0], pixel[1], pixel[2]])
            .collect();
        Self::from_rgb(width, height, rgb)
    }

    /// A zero-area frame, standing in for a failed or missing read.
    pub fn empty() -> Self {
        Self::from_image(RgbImage::new(0, 0))
    }

    /// A frame filled with a single colour. Mostly useful for tests and synthetic sources.
    pub fn filled(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        Self::from_image(RgbImage::from_pixel(width, height, image::Rgb(rgb)))
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    /// A zero-area frame carries no pixels and must not reach the background window.
    pub fn is_usable(&self) -> bool {
        self.width() > 0 && self.height() > 0
    }

    /// Shrinks the frame by an integer factor on each axis.
    ///
    /// A factor of 0 or 1, or an unusable frame, returns the frame unchanged.
    pub fn downscale(&self, factor: u32) -> Frame {
        if factor <= 1 || !self.is_usable() {
            return self.clone();
        }

        let width = (self.width() / factor).max(1);
        let height = (self.height() / factor).max(1);
        Self::from_image(imageops::resize(
            self.image.as_ref(),
            width,
            height,
            FilterType::Triangle,
        ))
    }
}
