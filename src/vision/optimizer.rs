//! Offline threshold/preset optimizer
//!
//! Runs the recognizer over a handful of sample frames for every preset and
//! threshold combination and keeps the one that recovers the most confident
//! text. Regions below the quality floor count against a combination, so a
//! permissive threshold only wins when it finds real text the stricter ones
//! miss. The result is stored per target and seeds the live pipeline.

use std::time::{Instant, SystemTime};

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::capture::Frame;
use crate::storage::{OptimalSettings, ProfileStore};
use crate::vision::{apply_preset, PreprocessingPreset, Recognizer};

/// Sweeps presets x thresholds over sample frames
pub struct Optimizer {
    presets: Vec<PreprocessingPreset>,
    thresholds: Vec<f32>,
    quality_floor: f32,
}

/// Confidence below which a recovered region is treated as noise
pub const DEFAULT_QUALITY_FLOOR: f32 = 0.4;

impl Default for Optimizer {
    fn default() -> Self {
        Self::new(
            PreprocessingPreset::default_ladder(),
            vec![0.7, 0.6, 0.5, 0.4, 0.3, 0.2],
        )
    }
}

impl Optimizer {
    pub fn new(presets: Vec<PreprocessingPreset>, thresholds: Vec<f32>) -> Self {
        let mut thresholds: Vec<f32> = thresholds
            .into_iter()
            .filter(|t| t.is_finite())
            .map(|t| t.clamp(0.0, 1.0))
            .collect();
        // Highest first so ties favour the stricter threshold
        thresholds.sort_by(|a, b| b.total_cmp(a));
        thresholds.dedup();

        Self {
            presets,
            thresholds,
            quality_floor: DEFAULT_QUALITY_FLOOR,
        }
    }

    pub fn with_quality_floor(mut self, floor: f32) -> Self {
        if floor.is_finite() {
            self.quality_floor = floor.clamp(0.0, 1.0);
        }
        self
    }

    /// Score every combination and return the best one.
    ///
    /// Each region recovered across all frames adds its confidence minus the
    /// quality floor, so noise lowers the score. Only combinations with a
    /// positive score are eligible. When none is, the result carries default
    /// values with `is_optimized = false`.
    pub fn optimize(&self, frames: &[Frame], recognizer: &mut dyn Recognizer) -> OptimalSettings {
        let start = Instant::now();

        if let Err(e) = recognizer.initialize() {
            warn!("Recognizer failed to initialize for optimization: {}", e);
        }

        let mut best: Option<(f32, &PreprocessingPreset, f32)> = None;
        let mut attempts = 0u32;

        for preset in &self.presets {
            let processed: Vec<_> = frames.iter().map(|f| apply_preset(f, preset)).collect();

            for &threshold in &self.thresholds {
                attempts += 1;
                let mut score = 0.0f32;
                for p in &processed {
                    match recognizer.detect_regions(&p.frame, threshold, preset) {
                        Ok(regions) => {
                            score += regions
                                .iter()
                                .filter(|r| !r.text.trim().is_empty())
                                .map(|r| r.confidence - self.quality_floor)
                                .sum::<f32>();
                        }
                        Err(e) => debug!("Optimizer sample failed: {}", e),
                    }
                }

                debug!("Preset '{}' @ {:.2}: score {:.3}", preset.name, threshold, score);
                if score > best.map(|(s, _, _)| s).unwrap_or(0.0) {
                    best = Some((score, preset, threshold));
                }
            }
        }

        match best {
            Some((score, preset, threshold)) => {
                info!(
                    "Optimization picked preset '{}' @ {:.2} (score {:.3}, {} combinations, {:?})",
                    preset.name,
                    threshold,
                    score,
                    attempts,
                    start.elapsed()
                );
                OptimalSettings {
                    preset: preset.clone(),
                    last_optimized: SystemTime::now(),
                    attempts,
                    is_optimized: true,
                    ..OptimalSettings::default()
                }
                .with_threshold(threshold)
            }
            None => {
                warn!("Optimization found no text in {} frame(s)", frames.len());
                OptimalSettings {
                    last_optimized: SystemTime::now(),
                    attempts,
                    ..OptimalSettings::default()
                }
            }
        }
    }

    /// Optimize and persist the result under `target_id`
    pub fn optimize_and_save(
        &self,
        target_id: &str,
        frames: &[Frame],
        recognizer: &mut dyn Recognizer,
        store: &dyn ProfileStore,
    ) -> Result<OptimalSettings> {
        let settings = self.optimize(frames, recognizer);
        store.save(target_id, &settings)?;
        Ok(settings)
    }
}
