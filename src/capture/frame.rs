//! Frame data structures for captured window content

use std::sync::Arc;
use std::time::Instant;

/// A captured frame of the target window.
///
/// Pixel data is RGBA, row-major, 4 bytes per pixel. The buffer is shared
/// behind an `Arc` so frames can be handed to worker threads and kept as a
/// change baseline without copying; it is never mutated after capture.
#[derive(Debug, Clone)]
pub struct Frame {
    data: Arc<[u8]>,
    width: u32,
    height: u32,
    captured_at: Instant,
}

impl Frame {
    /// Create a new frame stamped with the current time
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Self {
        Self::with_timestamp(data, width, height, Instant::now())
    }

    /// Create a frame with an explicit capture timestamp
    pub fn with_timestamp(data: Vec<u8>, width: u32, height: u32, captured_at: Instant) -> Self {
        Self {
            data: data.into(),
            width,
            height,
            captured_at,
        }
    }

    /// Create a frame filled with a single RGBA color
    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let pixels = width as usize * height as usize;
        let mut data = Vec::with_capacity(pixels * 4);
        for _ in 0..pixels {
            data.extend_from_slice(&rgba);
        }
        Self::new(data, width, height)
    }

    /// Raw RGBA bytes
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Get frame dimensions as (width, height)
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// When the frame was captured
    pub fn captured_at(&self) -> Instant {
        self.captured_at
    }

    /// Whether the buffer holds exactly `width * height` RGBA pixels
    pub fn is_well_formed(&self) -> bool {
        self.width > 0
            && self.height > 0
            && self.data.len() == self.width as usize * self.height as usize * 4
    }

    /// RGBA value at (x, y), or `None` if the coordinate falls outside the buffer
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = (y as usize * self.width as usize + x as usize) * 4;
        let px = self.data.get(idx..idx + 4)?;
        Some([px[0], px[1], px[2], px[3]])
    }
}
