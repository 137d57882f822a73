//! Vision/OCR Layer
//!
//! Decides when recognition needs to run and drives the external recognizer
//! through an adaptive retry ladder:
//! - change detection on sparse pixel samples
//! - perceptual-hash result cache
//! - preprocessing preset ladder
//! - recognition pipeline state machine
//! - offline threshold/preset optimizer

pub mod cache;
pub mod change;
pub mod optimizer;
pub mod pipeline;
pub mod preprocess;
pub mod worker;

use std::time::Instant;

use thiserror::Error;

use crate::capture::Frame;

pub use cache::{frame_hash, RecognitionCache};
pub use change::{ChangeConfig, ChangeDetector};
pub use optimizer::Optimizer;
pub use pipeline::{PipelineConfig, PipelineState, RecognitionOutcome, RecognitionPipeline, RegionSource};
pub use preprocess::{apply_preset, PreprocessSelector, PreprocessedFrame, PreprocessingPreset};
pub use worker::RecognizerWorker;

/// Axis-aligned bounding box in frame pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    /// Center point in (possibly fractional) pixels
    pub fn center(&self) -> (f32, f32) {
        (
            self.x as f32 + self.width as f32 / 2.0,
            self.y as f32 + self.height as f32 / 2.0,
        )
    }

    /// Euclidean distance between the centers of two boxes
    pub fn center_distance(&self, other: &Rect) -> f32 {
        let (ax, ay) = self.center();
        let (bx, by) = other.center();
        ((ax - bx).powi(2) + (ay - by).powi(2)).sqrt()
    }
}

/// Detected text region from OCR
#[derive(Debug, Clone)]
pub struct TextRegion {
    /// Detected text content
    pub text: String,
    /// Bounding box in original frame coordinates
    pub bounds: Rect,
    /// Confidence score (0.0 - 1.0)
    pub confidence: f32,
    /// When the region was recognized
    pub detected_at: Instant,
}

impl TextRegion {
    pub fn new(text: impl Into<String>, bounds: Rect, confidence: f32) -> Self {
        Self {
            text: text.into(),
            bounds,
            confidence: confidence.clamp(0.0, 1.0),
            detected_at: Instant::now(),
        }
    }

    /// Whether two regions sit at (nearly) the same place on screen
    pub fn is_similar(&self, other: &TextRegion, max_distance: f32) -> bool {
        self.bounds.center_distance(&other.bounds) <= max_distance
    }
}

/// Recognition backend failures. Each is treated as a zero-region attempt.
#[derive(Debug, Error)]
pub enum RecognitionError {
    #[error("recognizer is not initialized")]
    NotInitialized,

    #[error("recognizer timed out after {0} ms")]
    Timeout(u64),

    #[error("recognizer backend failed: {0}")]
    Backend(String),

    #[error("recognizer has shut down")]
    Shutdown,
}

/// External text recognizer
pub trait Recognizer: Send {
    /// Prepare the backend. Safe to call more than once.
    fn initialize(&mut self) -> Result<(), RecognitionError>;

    /// Detect text in an already-preprocessed frame, keeping only regions at
    /// or above `confidence_threshold`
    fn detect_regions(
        &mut self,
        frame: &Frame,
        confidence_threshold: f32,
        preset: &PreprocessingPreset,
    ) -> Result<Vec<TextRegion>, RecognitionError>;
}

impl<R: Recognizer + ?Sized> Recognizer for Box<R> {
    fn initialize(&mut self) -> Result<(), RecognitionError> {
        (**self).initialize()
    }

    fn detect_regions(
        &mut self,
        frame: &Frame,
        confidence_threshold: f32,
        preset: &PreprocessingPreset,
    ) -> Result<Vec<TextRegion>, RecognitionError> {
        (**self).detect_regions(frame, confidence_threshold, preset)
    }
}

/// Center of the `index`-th of `grid` equal cells along an axis of `extent`
/// pixels, clamped inside the axis. Shared by the change detector's samples
/// and the frame hash.
pub(crate) fn grid_coord(index: u32, grid: u32, extent: u32) -> u32 {
    let pos = ((2 * index as u64 + 1) * extent as u64) / (2 * grid.max(1) as u64);
    (pos as u32).min(extent.saturating_sub(1))
}
