// THEORY:
// A `FrameSource` is the capture collaborator: a blocking pull of the next frame.
// End of stream is `Ok(None)`, never an error, so the run loops can terminate
// cleanly. Errors are reserved for a source that cannot continue at all.
//
// A frame that fails to decode is not fatal. It is yielded as an empty frame, and
// the pipeline treats it like any other degenerate read and skips it.

use crate::core_modules::frame::Frame;
use anyhow::{Context, Result};
use log::warn;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "ppm", "pgm", "tif", "tiff", "webp"];

/// A blocking supplier of frames.
pub trait FrameSource {
    /// The next frame, or `None` once the stream has ended.
    fn next_frame(&mut self) -> Result<Option<Frame>>;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        (**self).next_frame()
    }
}

/// Reads a directory of still images in lexicographic file-name order.
#[derive(Debug)]
pub struct ImageSequenceSource {
    paths: VecDeque<PathBuf>,
}

impl ImageSequenceSource {
    pub fn open(directory: impl AsRef<Path>) -> Result<Self> {
        let directory = directory.as_ref();
        let mut paths = Vec::new();

        for entry in std::fs::read_dir(directory)
            .with_context(|| format!("reading frame directory {}", directory.display()))?
        {
            let path = entry?.path();
            let is_image = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()));
            if path.is_file() && is_image {
                paths.push(path);
            }
        }

        paths.sort();
        Ok(Self {
            paths: paths.into(),
        })
    }

    /// Frames not yet read.
    pub fn remaining(&self) -> usize {
        self.paths.len()
    }
}

impl FrameSource for ImageSequenceSource {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let Some(path) = self.paths.pop_front() else {
            return Ok(None);
        };

        match image::open(&path) {
            Ok(image) => Ok(Some(Frame::from_dynamic(image))),
            Err(e) => {
                warn!("could not decode {}: {e}", path.display());
                Ok(Some(Frame::empty()))
            }
        }
    }
}

/// Frames held in memory, handed out in order.
#[derive(Debug, Default)]
pub struct MemorySource {
    frames: VecDeque<Frame>,
}

impl MemorySource {
    pub fn new(frames: impl IntoIterator<Item = Frame>) -> Self {
        Self {
            frames: frames.into_iter().collect(),
        }
    }
}

impl FrameSource for MemorySource {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        Ok(self.frames.pop_front())
    }
}
