//! Capture Layer
//!
//! The core never enumerates or selects windows itself; it pulls frames from
//! a [`FrameSource`] supplied by the host. A failed capture means "no frame
//! this tick", never a fatal error.

pub mod frame;

pub use frame::Frame;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use thiserror::Error;
use tracing::{debug, info};

/// Opaque handle identifying the captured window
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WindowHandle(pub String);

impl WindowHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for WindowHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Capture failures. All of them are transient from the core's point of view.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("window {0} is closed or unavailable")]
    WindowClosed(WindowHandle),

    #[error("frame source exhausted")]
    Exhausted,

    #[error("failed to decode frame {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: image::ImageError,
    },
}

/// Source of captured frames
pub trait FrameSource: Send {
    fn capture(&mut self, window: &WindowHandle) -> Result<Frame, CaptureError>;
}

/// Replays a directory of screenshots as successive frames.
///
/// Files are visited in lexical order. Once the end is reached the source
/// either reports [`CaptureError::Exhausted`] or starts over when looping.
pub struct ImageSequenceSource {
    paths: Vec<PathBuf>,
    position: usize,
    looping: bool,
}

impl ImageSequenceSource {
    /// Collect every PNG/JPEG/BMP file in `dir`
    pub fn from_dir(dir: &Path, looping: bool) -> Result<Self> {
        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir)
            .with_context(|| format!("Failed to read frame directory {:?}", dir))?
        {
            let path = entry?.path();
            let is_image = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| matches!(e.to_ascii_lowercase().as_str(), "png" | "jpg" | "jpeg" | "bmp"))
                .unwrap_or(false);
            if is_image {
                paths.push(path);
            }
        }
        paths.sort();
        info!("Loaded {} frame(s) from {:?}", paths.len(), dir);
        Ok(Self::from_paths(paths, looping))
    }

    pub fn from_paths(paths: Vec<PathBuf>, looping: bool) -> Self {
        Self {
            paths,
            position: 0,
            looping,
        }
    }

    /// Number of frames in the sequence
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

impl FrameSource for ImageSequenceSource {
    fn capture(&mut self, _window: &WindowHandle) -> Result<Frame, CaptureError> {
        if self.position >= self.paths.len() {
            if !self.looping || self.paths.is_empty() {
                return Err(CaptureError::Exhausted);
            }
            self.position = 0;
        }

        let path = &self.paths[self.position];
        self.position += 1;

        let img = image::open(path).map_err(|source| CaptureError::Decode {
            path: path.display().to_string(),
            source,
        })?;
        let rgba = img.to_rgba8();
        let (width, height) = rgba.dimensions();
        debug!("Replaying frame {:?} ({}x{})", path, width, height);

        Ok(Frame::new(rgba.into_raw(), width, height))
    }
}
