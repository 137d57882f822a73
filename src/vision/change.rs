//! Frame change detection
//!
//! Compares each frame against the previously seen one on a sparse sample
//! grid instead of every pixel, so the gate costs a few hundred pixel reads
//! per tick regardless of window size.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::capture::Frame;
use crate::vision::grid_coord;

/// Change detection tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChangeConfig {
    /// Samples per axis (grid_size x grid_size points)
    pub grid_size: u32,
    /// Summed absolute RGB difference above which a sample counts as changed
    pub pixel_noise_threshold: u32,
    /// Fraction of changed samples above which the frame counts as changed
    pub difference_threshold: f32,
}

impl Default for ChangeConfig {
    fn default() -> Self {
        Self {
            grid_size: 20,
            pixel_noise_threshold: 30,
            difference_threshold: 0.01,
        }
    }
}

/// Gates recognition on visible change between successive frames
pub struct ChangeDetector {
    config: ChangeConfig,
    previous: Option<Frame>,
}

impl ChangeDetector {
    pub fn new(config: ChangeConfig) -> Self {
        Self {
            config,
            previous: None,
        }
    }

    /// Whether `current` differs enough from the previous frame to rerun OCR.
    ///
    /// The previous frame is replaced by `current` on every call. Without a
    /// baseline, on a size change, or on a malformed frame this reports a
    /// change.
    pub fn has_significant_change(&mut self, current: &Frame) -> bool {
        let changed = match self.previous.as_ref() {
            None => true,
            Some(prev) if prev.dimensions() != current.dimensions() => {
                debug!(
                    "Frame size changed {:?} -> {:?}",
                    prev.dimensions(),
                    current.dimensions()
                );
                true
            }
            Some(prev) => match self.difference_ratio(prev, current) {
                Some(ratio) => ratio > self.config.difference_threshold,
                None => {
                    warn!("Change detection failed on malformed frame, assuming change");
                    true
                }
            },
        };

        self.previous = Some(current.clone());
        changed
    }

    /// Fraction of grid samples whose color moved past the noise threshold.
    /// `None` when a sample falls outside either buffer.
    pub fn difference_ratio(&self, previous: &Frame, current: &Frame) -> Option<f32> {
        if !previous.is_well_formed() || !current.is_well_formed() {
            return None;
        }

        let (width, height) = current.dimensions();
        let grid = self.config.grid_size.max(1);
        let mut different = 0u32;
        let mut total = 0u32;

        for gy in 0..grid {
            let y = grid_coord(gy, grid, height);
            for gx in 0..grid {
                let x = grid_coord(gx, grid, width);
                let a = previous.pixel(x, y)?;
                let b = current.pixel(x, y)?;

                let diff: u32 = (0..3).map(|c| a[c].abs_diff(b[c]) as u32).sum();
                if diff > self.config.pixel_noise_threshold {
                    different += 1;
                }
                total += 1;
            }
        }

        Some(different as f32 / total as f32)
    }

    /// Forget the baseline so the next frame always counts as changed
    pub fn reset(&mut self) {
        self.previous = None;
    }

    pub fn has_baseline(&self) -> bool {
        self.previous.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paint_block(frame: &Frame, x0: u32, y0: u32, w: u32, h: u32, color: [u8; 4]) -> Frame {
        let mut data = frame.data().to_vec();
        for y in y0..y0 + h {
            for x in x0..x0 + w {
                let idx = ((y * frame.width() + x) * 4) as usize;
                data[idx..idx + 4].copy_from_slice(&color);
            }
        }
        Frame::new(data, frame.width(), frame.height())
    }

    #[test]
    fn test_first_frame_counts_as_change() {
        let mut detector = ChangeDetector::new(ChangeConfig::default());
        let frame = Frame::solid(100, 100, [0, 0, 0, 255]);
        assert!(detector.has_significant_change(&frame));
    }

    #[test]
    fn test_same_frame_twice_is_unchanged() {
        let mut detector = ChangeDetector::new(ChangeConfig::default());
        let frame = Frame::solid(100, 100, [40, 40, 40, 255]);
        assert!(detector.has_significant_change(&frame));
        assert!(!detector.has_significant_change(&frame));
    }

    #[test]
    fn test_size_change_is_change() {
        let mut detector = ChangeDetector::new(ChangeConfig::default());
        detector.has_significant_change(&Frame::solid(100, 100, [0, 0, 0, 255]));
        assert!(detector.has_significant_change(&Frame::solid(120, 100, [0, 0, 0, 255])));
    }

    #[test]
    fn test_noise_below_threshold_is_ignored() {
        let mut detector = ChangeDetector::new(ChangeConfig::default());
        detector.has_significant_change(&Frame::solid(100, 100, [100, 100, 100, 255]));
        // 3 * 5 = 15, under the default noise threshold of 30
        assert!(!detector.has_significant_change(&Frame::solid(100, 100, [105, 105, 105, 255])));
    }

    #[test]
    fn test_large_block_change_is_detected() {
        let mut detector = ChangeDetector::new(ChangeConfig::default());
        let base = Frame::solid(200, 200, [0, 0, 0, 255]);
        detector.has_significant_change(&base);

        let changed = paint_block(&base, 0, 0, 100, 100, [255, 255, 255, 255]);
        assert!(detector.has_significant_change(&changed));
    }

    #[test]
    fn test_change_between_samples_is_missed() {
        let mut detector = ChangeDetector::new(ChangeConfig::default());
        let base = Frame::solid(200, 200, [0, 0, 0, 255]);
        detector.has_significant_change(&base);

        // Sample points sit at 5, 15, 25, ... so a 2x2 block at (0,0) is invisible
        let changed = paint_block(&base, 0, 0, 2, 2, [255, 255, 255, 255]);
        assert!(!detector.has_significant_change(&changed));
    }

    #[test]
    fn test_baseline_is_replaced_every_call() {
        let mut detector = ChangeDetector::new(ChangeConfig::default());
        let dark = Frame::solid(100, 100, [0, 0, 0, 255]);
        let light = Frame::solid(100, 100, [255, 255, 255, 255]);

        detector.has_significant_change(&dark);
        assert!(detector.has_significant_change(&light));
        assert!(!detector.has_significant_change(&light));
    }

    #[test]
    fn test_malformed_frame_fails_open() {
        let mut detector = ChangeDetector::new(ChangeConfig::default());
        detector.has_significant_change(&Frame::solid(10, 10, [0, 0, 0, 255]));
        let broken = Frame::new(vec![0; 12], 10, 10);
        assert!(detector.has_significant_change(&broken));
    }
}
