//! Recognition pipeline
//!
//! One call to [`RecognitionPipeline::process`] walks the state machine
//!
//! ```text
//! Idle -> CacheCheck -> ChangeGate -> Recognizing -> { Success, Retrying, Exhausted }
//!                                         ^               |
//!                                         +---------------+
//! ```
//!
//! A cache hit or an unchanged frame ends in `Success` without touching the
//! recognizer. An empty attempt relaxes the confidence threshold and moves to
//! the next preprocessing preset; both are restored once the tick ends.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::capture::Frame;
use crate::storage::OptimalSettings;
use crate::vision::{
    apply_preset, ChangeDetector, PreprocessSelector, PreprocessingPreset, RecognitionCache,
    RecognitionError, Recognizer, TextRegion,
};

/// Recognition tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Starting confidence threshold (0.0 - 1.0)
    pub confidence_threshold: f32,
    /// Attempts after the first one before giving up
    pub max_retries: u32,
    /// Threshold reduction per retry
    pub threshold_step: f32,
    /// Lowest threshold a retry may reach
    pub threshold_floor: f32,
    /// Recognition cache capacity
    pub cache_capacity: usize,
    /// Samples per axis for the frame hash
    pub hash_grid: u32,
    /// Per-call recognizer timeout
    pub timeout_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.5,
            max_retries: 2,
            threshold_step: 0.1,
            threshold_floor: 0.1,
            cache_capacity: 200,
            hash_grid: 5,
            timeout_ms: 3000,
        }
    }
}

/// Pipeline state machine states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    CacheCheck,
    ChangeGate,
    Recognizing { attempt: u32 },
    Retrying { attempt: u32 },
    Success,
    Exhausted,
}

/// Where the regions of an outcome came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionSource {
    /// Perceptually identical frame seen before
    Cache,
    /// No significant change, previous regions reused
    Unchanged,
    /// Recognizer found text on the given attempt
    Recognized { attempts: u32 },
    /// Every attempt came back empty
    Exhausted { attempts: u32 },
    /// The pipeline was shut down mid-tick
    Aborted,
}

/// Result of one pipeline tick
#[derive(Debug, Clone)]
pub struct RecognitionOutcome {
    pub regions: Vec<TextRegion>,
    pub source: RegionSource,
    pub state: PipelineState,
}

impl RecognitionOutcome {
    pub fn is_success(&self) -> bool {
        self.state == PipelineState::Success
    }

    pub fn has_text(&self) -> bool {
        !self.regions.is_empty()
    }

    /// Whether the recognizer actually ran this tick
    pub fn ran_recognizer(&self) -> bool {
        matches!(
            self.source,
            RegionSource::Recognized { .. } | RegionSource::Exhausted { .. }
        )
    }
}

/// Orchestrates cache lookup, change gating and the adaptive retry ladder
pub struct RecognitionPipeline {
    recognizer: Box<dyn Recognizer>,
    detector: ChangeDetector,
    selector: PreprocessSelector,
    cache: Arc<RecognitionCache>,
    config: PipelineConfig,
    base_threshold: f32,
    current_threshold: f32,
    previous_regions: Vec<TextRegion>,
    state: PipelineState,
    trace: Vec<PipelineState>,
    initialized: bool,
    shutdown: Arc<AtomicBool>,
}

impl RecognitionPipeline {
    pub fn new(
        recognizer: Box<dyn Recognizer>,
        detector: ChangeDetector,
        selector: PreprocessSelector,
        cache: Arc<RecognitionCache>,
        config: PipelineConfig,
    ) -> Self {
        let base_threshold = sanitize_threshold(config.confidence_threshold);
        Self {
            recognizer,
            detector,
            selector,
            cache,
            config,
            base_threshold,
            current_threshold: base_threshold,
            previous_regions: Vec::new(),
            state: PipelineState::Idle,
            trace: Vec::new(),
            initialized: false,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Seed threshold and preset ladder from a stored profile
    pub fn apply_settings(&mut self, settings: &OptimalSettings) {
        info!(
            "Applying profile: threshold={:.2}, preset='{}'",
            settings.confidence_threshold, settings.preset.name
        );
        self.set_confidence_threshold(settings.confidence_threshold);
        self.selector.apply_named(settings);
    }

    /// Change the base confidence threshold; out-of-range values are clamped
    pub fn set_confidence_threshold(&mut self, threshold: f32) {
        self.base_threshold = sanitize_threshold(threshold);
        self.current_threshold = self.base_threshold;
    }

    pub fn confidence_threshold(&self) -> f32 {
        self.current_threshold
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// States visited during the most recent tick
    pub fn trace(&self) -> &[PipelineState] {
        &self.trace
    }

    pub fn previous_regions(&self) -> &[TextRegion] {
        &self.previous_regions
    }

    pub fn selector(&self) -> &PreprocessSelector {
        &self.selector
    }

    pub fn cache(&self) -> &Arc<RecognitionCache> {
        &self.cache
    }

    /// Handle that aborts the retry ladder when set
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    fn is_shut_down(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    fn transition(&mut self, next: PipelineState) {
        self.state = next;
        self.trace.push(next);
    }

    /// Run one tick on `frame`
    pub fn process(&mut self, frame: &Frame) -> RecognitionOutcome {
        let start = Instant::now();
        self.trace.clear();
        self.state = PipelineState::Idle;

        if self.is_shut_down() {
            return self.abort();
        }

        self.transition(PipelineState::CacheCheck);
        let key = self.cache.key_for(frame);
        if let Some(regions) = self.cache.get_by_key(key) {
            debug!("Recognition cache hit {:016x} ({} regions)", key, regions.len());
            self.previous_regions = regions.clone();
            return self.finish(PipelineState::Success, regions, RegionSource::Cache);
        }

        self.transition(PipelineState::ChangeGate);
        if !self.detector.has_significant_change(frame) {
            debug!("No significant change, reusing {} regions", self.previous_regions.len());
            let regions = self.previous_regions.clone();
            return self.finish(PipelineState::Success, regions, RegionSource::Unchanged);
        }

        let max_attempts = self.config.max_retries + 1;
        let mut attempt = 1;
        loop {
            if self.is_shut_down() {
                return self.abort();
            }

            self.transition(PipelineState::Recognizing { attempt });
            let preset = self.selector.current();
            let regions = match self.attempt(frame, &preset) {
                Ok(regions) => regions,
                Err(RecognitionError::Shutdown) => return self.abort(),
                Err(e) => {
                    warn!("Recognition attempt {} failed: {}", attempt, e);
                    Vec::new()
                }
            };

            if !regions.is_empty() {
                info!(
                    "Recognized {} regions on attempt {} (threshold {:.2}, preset '{}') in {:?}",
                    regions.len(),
                    attempt,
                    self.current_threshold,
                    preset.name,
                    start.elapsed()
                );
                self.cache.put_by_key(key, regions.clone());
                self.previous_regions = regions.clone();
                self.restore();
                return self.finish(
                    PipelineState::Success,
                    regions,
                    RegionSource::Recognized { attempts: attempt },
                );
            }

            if attempt >= max_attempts {
                debug!("Retry ladder exhausted after {} attempts", attempt);
                self.previous_regions.clear();
                self.restore();
                return self.finish(
                    PipelineState::Exhausted,
                    Vec::new(),
                    RegionSource::Exhausted { attempts: attempt },
                );
            }

            self.transition(PipelineState::Retrying { attempt });
            self.relax();
            attempt += 1;
        }
    }

    /// One recognizer call with the current threshold and preset
    fn attempt(
        &mut self,
        frame: &Frame,
        preset: &PreprocessingPreset,
    ) -> Result<Vec<TextRegion>, RecognitionError> {
        if !self.initialized {
            self.recognizer.initialize()?;
            self.initialized = true;
        }

        let processed = apply_preset(frame, preset);
        let threshold = self.current_threshold;
        let found = self
            .recognizer
            .detect_regions(&processed.frame, threshold, preset)?;

        let original = frame.dimensions();
        Ok(found
            .into_iter()
            .filter(|r| !r.text.trim().is_empty())
            .map(|mut r| {
                r.bounds = processed.to_original(r.bounds, original);
                r
            })
            .collect())
    }

    /// Lower the threshold one step (never below the floor, never upward) and
    /// move to the next preset
    fn relax(&mut self) {
        let floor = self.config.threshold_floor.min(self.current_threshold);
        self.current_threshold = (self.current_threshold - self.config.threshold_step).max(floor);
        if !self.selector.advance() {
            debug!("Preset ladder exhausted, staying on '{}'", self.selector.current().name);
        }
        debug!("Retrying with threshold {:.2}", self.current_threshold);
    }

    fn restore(&mut self) {
        self.current_threshold = self.base_threshold;
        self.selector.reset();
    }

    fn abort(&mut self) -> RecognitionOutcome {
        info!("Recognition aborted by shutdown");
        self.restore();
        self.finish(PipelineState::Exhausted, Vec::new(), RegionSource::Aborted)
    }

    fn finish(
        &mut self,
        state: PipelineState,
        regions: Vec<TextRegion>,
        source: RegionSource,
    ) -> RecognitionOutcome {
        self.transition(state);
        RecognitionOutcome {
            regions,
            source,
            state,
        }
    }
}

fn sanitize_threshold(threshold: f32) -> f32 {
    if threshold.is_nan() {
        warn!("Confidence threshold is NaN, using 0.5");
        0.5
    } else if !(0.0..=1.0).contains(&threshold) {
        let clamped = threshold.clamp(0.0, 1.0);
        warn!("Confidence threshold {} out of range, using {}", threshold, clamped);
        clamped
    } else {
        threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vision::testing::{region, ScriptedRecognizer};
    use crate::vision::{ChangeConfig, Rect};
    use std::time::SystemTime;

    fn pipeline_with(recognizer: &ScriptedRecognizer, config: PipelineConfig) -> RecognitionPipeline {
        RecognitionPipeline::new(
            Box::new(recognizer.clone()),
            ChangeDetector::new(ChangeConfig::default()),
            PreprocessSelector::default(),
            Arc::new(RecognitionCache::new(config.cache_capacity)),
            config,
        )
    }

    fn frame(shade: u8) -> Frame {
        Frame::solid(100, 100, [shade, shade, shade, 255])
    }

    #[test]
    fn test_retry_ladder_bounds() {
        let recognizer = ScriptedRecognizer::new();
        let mut pipeline = pipeline_with(&recognizer, PipelineConfig::default());

        let outcome = pipeline.process(&frame(0));
        assert_eq!(outcome.state, PipelineState::Exhausted);
        assert_eq!(outcome.source, RegionSource::Exhausted { attempts: 3 });
        assert!(outcome.regions.is_empty());

        let calls = recognizer.calls();
        assert_eq!(calls.len(), 3);
        for pair in calls.windows(2) {
            assert!(pair[1].threshold < pair[0].threshold);
        }
        assert!((calls[0].threshold - 0.5).abs() < 1e-6);
        assert!((calls[2].threshold - 0.3).abs() < 1e-6);

        // Presets advance in lockstep with the threshold
        let presets: Vec<_> = calls.iter().map(|c| c.preset.as_str()).collect();
        assert_eq!(presets, ["neutral", "high_contrast", "upscaled"]);

        // Relaxation is transient
        assert!((pipeline.confidence_threshold() - 0.5).abs() < 1e-6);
        assert_eq!(pipeline.selector().index(), 0);
    }

    #[test]
    fn test_threshold_stops_at_floor() {
        let recognizer = ScriptedRecognizer::new();
        let config = PipelineConfig {
            confidence_threshold: 0.15,
            max_retries: 3,
            ..Default::default()
        };
        let mut pipeline = pipeline_with(&recognizer, config);
        pipeline.process(&frame(0));

        let thresholds: Vec<f32> = recognizer.calls().iter().map(|c| c.threshold).collect();
        assert_eq!(thresholds.len(), 4);
        assert!((thresholds[0] - 0.15).abs() < 1e-6);
        for t in &thresholds[1..] {
            assert!((t - 0.1).abs() < 1e-6);
        }
        for pair in thresholds.windows(2) {
            assert!(pair[1] <= pair[0]);
        }
    }

    #[test]
    fn test_success_on_retry_populates_cache() {
        let recognizer = ScriptedRecognizer::new();
        recognizer.push(Ok(Vec::new()));
        recognizer.push(Ok(vec![region("Quest complete", 10, 10)]));
        let mut pipeline = pipeline_with(&recognizer, PipelineConfig::default());

        let outcome = pipeline.process(&frame(50));
        assert!(outcome.is_success());
        assert!(outcome.ran_recognizer());
        assert_eq!(outcome.source, RegionSource::Recognized { attempts: 2 });
        assert_eq!(outcome.regions[0].text, "Quest complete");
        assert_eq!(pipeline.cache().len(), 1);
        assert_eq!(pipeline.previous_regions().len(), 1);
        assert!((pipeline.confidence_threshold() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_cache_hit_skips_change_gate_and_recognizer() {
        let recognizer = ScriptedRecognizer::new();
        recognizer.push(Ok(vec![region("Inventory", 0, 0)]));
        let mut pipeline = pipeline_with(&recognizer, PipelineConfig::default());

        pipeline.process(&frame(80));
        let outcome = pipeline.process(&frame(80));

        assert_eq!(outcome.source, RegionSource::Cache);
        assert_eq!(outcome.regions[0].text, "Inventory");
        assert_eq!(recognizer.call_count(), 1);
        assert_eq!(
            pipeline.trace(),
            &[PipelineState::CacheCheck, PipelineState::Success]
        );
    }

    #[test]
    fn test_unchanged_frame_reuses_previous_regions() {
        let recognizer = ScriptedRecognizer::new();
        recognizer.push(Ok(vec![region("Level 3", 0, 0)]));
        let mut pipeline = pipeline_with(&recognizer, PipelineConfig::default());

        let base = frame(0);
        pipeline.process(&base);

        // One pixel on the hash grid changes, none on the change grid
        let mut data = base.data().to_vec();
        let idx = (10 * 100 + 10) * 4;
        data[idx..idx + 3].copy_from_slice(&[255, 255, 255]);
        let nudged = Frame::new(data, 100, 100);

        let outcome = pipeline.process(&nudged);
        assert_eq!(outcome.source, RegionSource::Unchanged);
        assert!(outcome.is_success());
        assert_eq!(outcome.regions[0].text, "Level 3");
        assert_eq!(recognizer.call_count(), 1);
    }

    #[test]
    fn test_exhausted_frame_stays_quiet_until_change() {
        let recognizer = ScriptedRecognizer::new();
        let mut pipeline = pipeline_with(&recognizer, PipelineConfig::default());

        pipeline.process(&frame(0));
        let outcome = pipeline.process(&frame(0));
        assert_eq!(outcome.source, RegionSource::Unchanged);
        assert!(outcome.regions.is_empty());
        assert_eq!(recognizer.call_count(), 3);

        let outcome = pipeline.process(&frame(255));
        assert_eq!(outcome.source, RegionSource::Exhausted { attempts: 3 });
        assert_eq!(recognizer.call_count(), 6);
    }

    #[test]
    fn test_recognizer_error_counts_as_empty_attempt() {
        let recognizer = ScriptedRecognizer::new();
        recognizer.push(Err(RecognitionError::Backend("device lost".to_string())));
        recognizer.push(Ok(vec![region("Retry", 0, 0)]));
        let mut pipeline = pipeline_with(&recognizer, PipelineConfig::default());

        let outcome = pipeline.process(&frame(10));
        assert_eq!(outcome.source, RegionSource::Recognized { attempts: 2 });
    }

    #[test]
    fn test_timeout_counts_as_empty_attempt() {
        let recognizer = ScriptedRecognizer::new();
        for _ in 0..3 {
            recognizer.push(Err(RecognitionError::Timeout(3000)));
        }
        let mut pipeline = pipeline_with(&recognizer, PipelineConfig::default());

        let outcome = pipeline.process(&frame(10));
        assert_eq!(outcome.state, PipelineState::Exhausted);
        assert_eq!(recognizer.call_count(), 3);
    }

    #[test]
    fn test_shutdown_before_tick_aborts() {
        let recognizer = ScriptedRecognizer::new();
        let mut pipeline = pipeline_with(&recognizer, PipelineConfig::default());
        pipeline.shutdown();

        let outcome = pipeline.process(&frame(10));
        assert_eq!(outcome.state, PipelineState::Exhausted);
        assert_eq!(outcome.source, RegionSource::Aborted);
        assert_eq!(recognizer.call_count(), 0);
    }

    #[test]
    fn test_shutdown_error_aborts_ladder() {
        let recognizer = ScriptedRecognizer::new();
        recognizer.push(Err(RecognitionError::Shutdown));
        let mut pipeline = pipeline_with(&recognizer, PipelineConfig::default());

        let outcome = pipeline.process(&frame(10));
        assert_eq!(outcome.source, RegionSource::Aborted);
        assert_eq!(recognizer.call_count(), 1);
        assert!((pipeline.confidence_threshold() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_apply_settings_seeds_first_attempt() {
        let recognizer = ScriptedRecognizer::new();
        let mut pipeline = pipeline_with(&recognizer, PipelineConfig::default());
        pipeline.apply_settings(&OptimalSettings {
            confidence_threshold: 0.3,
            preset: PreprocessingPreset::sharpened(),
            last_optimized: SystemTime::now(),
            attempts: 5,
            is_optimized: true,
        });

        pipeline.process(&frame(10));
        let calls = recognizer.calls();
        assert_eq!(calls[0].preset, "sharpened");
        assert!((calls[0].threshold - 0.3).abs() < 1e-6);
        assert_eq!(calls[1].preset, "neutral");
    }

    #[test]
    fn test_bounds_are_mapped_back_from_upscaled_frame() {
        let recognizer = ScriptedRecognizer::new();
        recognizer.push(Ok(Vec::new()));
        recognizer.push(Ok(Vec::new()));
        // Third attempt runs on the 2x upscaled, 8 px padded preset
        recognizer.push(Ok(vec![TextRegion::new("Boss", Rect::new(28, 48, 40, 20), 0.8)]));
        let mut pipeline = pipeline_with(&recognizer, PipelineConfig::default());

        let outcome = pipeline.process(&frame(30));
        assert_eq!(recognizer.calls()[2].width, 216);
        assert_eq!(outcome.regions[0].bounds, Rect::new(10, 20, 20, 10));
    }

    #[test]
    fn test_blank_text_is_dropped() {
        let recognizer = ScriptedRecognizer::new();
        recognizer.push(Ok(vec![region("   ", 0, 0)]));
        let config = PipelineConfig {
            max_retries: 0,
            ..Default::default()
        };
        let mut pipeline = pipeline_with(&recognizer, config);

        let outcome = pipeline.process(&frame(30));
        assert_eq!(outcome.source, RegionSource::Exhausted { attempts: 1 });
        assert!(pipeline.cache().is_empty());
    }

    #[test]
    fn test_out_of_range_threshold_is_clamped() {
        let recognizer = ScriptedRecognizer::new();
        let mut pipeline = pipeline_with(&recognizer, PipelineConfig::default());
        pipeline.set_confidence_threshold(1.4);
        assert_eq!(pipeline.confidence_threshold(), 1.0);
    }
}
