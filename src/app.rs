//! Translator Session
//!
//! Wires capture, the recognition pipeline and the translation orchestrator
//! together:
//! - a tick thread that captures and recognizes periodically
//! - a translation worker fed through a channel
//! - an event channel the host drains for results
//!
//! A tick that arrives while the previous one is still running is skipped,
//! never queued.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{Context, Result};
use crossbeam_channel::{select, tick, unbounded, Receiver, Sender};
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::capture::{CaptureError, FrameSource, WindowHandle};
use crate::config::{AppConfig, TranslationSettings};
use crate::storage::OptimalSettings;
use crate::translation::{
    HttpTranslationEngine, ScriptDetector, StaticLicense, TranslationCache, TranslationEngine,
    TranslationOrchestrator, TranslationOutcome,
};
use crate::vision::{
    ChangeDetector, PreprocessSelector, PreprocessingPreset, RecognitionCache, RecognitionOutcome,
    RecognitionPipeline, Recognizer, RecognizerWorker, RegionSource, TextRegion,
};

/// Events published by a running session
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// A tick produced text regions
    RegionsDetected {
        regions: Vec<TextRegion>,
        source: RegionSource,
    },
    /// A tick finished without any text
    NoRegions { source: RegionSource },
    /// A region finished translating
    TranslationReady {
        region: TextRegion,
        outcome: TranslationOutcome,
    },
    /// No frame could be captured this tick
    CaptureFailed { error: String },
}

/// Result of a periodic tick
#[derive(Debug)]
pub enum TickResult {
    /// The previous tick was still running
    Skipped,
    CaptureFailed,
    Completed(RecognitionOutcome),
}

/// Session tuning
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub tick_interval: Duration,
    /// Queue newly seen regions for translation automatically
    pub auto_translate: bool,
    pub similar_distance_px: f32,
    pub text_similarity: f64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(500),
            auto_translate: true,
            similar_distance_px: 10.0,
            text_similarity: 0.9,
        }
    }
}

impl SessionConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            tick_interval: Duration::from_millis(config.capture.tick_interval_ms.max(1)),
            auto_translate: true,
            similar_distance_px: config.translation.similar_distance_px,
            text_similarity: config.translation.text_similarity,
        }
    }
}

/// Snapshot of session counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub ticks: u64,
    pub skipped_ticks: u64,
    pub capture_failures: u64,
    pub translations_queued: u64,
}

/// Remembers which on-screen text was already sent for translation.
///
/// A region counts as already seen when an earlier region sits within
/// `max_distance` pixels and carries nearly the same text.
#[derive(Debug, Clone)]
pub struct RegionTracker {
    seen: Vec<TextRegion>,
    max_distance: f32,
    min_similarity: f64,
}

impl RegionTracker {
    pub fn new(max_distance: f32, min_similarity: f64) -> Self {
        Self {
            seen: Vec::new(),
            max_distance,
            min_similarity,
        }
    }

    pub fn is_known(&self, region: &TextRegion) -> bool {
        self.seen.iter().any(|seen| {
            seen.is_similar(region, self.max_distance)
                && strsim::normalized_levenshtein(seen.text.trim(), region.text.trim())
                    >= self.min_similarity
        })
    }

    /// Regions of the current frame that were not on the previous one.
    /// The current frame becomes the new reference.
    pub fn update(&mut self, regions: &[TextRegion]) -> Vec<TextRegion> {
        let fresh: Vec<TextRegion> = regions
            .iter()
            .filter(|r| !self.is_known(r))
            .cloned()
            .collect();
        self.seen = regions.to_vec();
        fresh
    }

    pub fn clear(&mut self) {
        self.seen.clear();
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

enum WorkerMessage {
    Translate(TextRegion),
    Shutdown,
}

#[derive(Default)]
struct Counters {
    ticks: AtomicU64,
    skipped_ticks: AtomicU64,
    capture_failures: AtomicU64,
    translations_queued: AtomicU64,
}

/// State shared between the session handle and its tick thread
struct SessionShared {
    window: WindowHandle,
    source: Mutex<Box<dyn FrameSource>>,
    pipeline: Mutex<RecognitionPipeline>,
    tracker: Mutex<RegionTracker>,
    auto_translate: bool,
    jobs: Sender<WorkerMessage>,
    events: Sender<SessionEvent>,
    counters: Counters,
}

impl SessionShared {
    fn tick(&self) -> TickResult {
        self.counters.ticks.fetch_add(1, Ordering::Relaxed);
        let Some(mut pipeline) = self.pipeline.try_lock() else {
            self.counters.skipped_ticks.fetch_add(1, Ordering::Relaxed);
            debug!("Previous tick still running, skipping");
            return TickResult::Skipped;
        };

        match self.run(&mut pipeline) {
            Ok(outcome) => TickResult::Completed(outcome),
            Err(_) => TickResult::CaptureFailed,
        }
    }

    fn run(&self, pipeline: &mut RecognitionPipeline) -> Result<RecognitionOutcome, CaptureError> {
        let frame = match self.source.lock().capture(&self.window) {
            Ok(frame) => frame,
            Err(e) => {
                self.counters.capture_failures.fetch_add(1, Ordering::Relaxed);
                warn!("Capture of {} failed: {}", self.window, e);
                let _ = self.events.send(SessionEvent::CaptureFailed {
                    error: e.to_string(),
                });
                return Err(e);
            }
        };

        let outcome = pipeline.process(&frame);
        self.publish(&outcome);
        Ok(outcome)
    }

    fn publish(&self, outcome: &RecognitionOutcome) {
        if !outcome.has_text() {
            let _ = self.events.send(SessionEvent::NoRegions {
                source: outcome.source,
            });
            if outcome.ran_recognizer() {
                self.tracker.lock().clear();
            }
            return;
        }

        let _ = self.events.send(SessionEvent::RegionsDetected {
            regions: outcome.regions.clone(),
            source: outcome.source,
        });

        let fresh = self.tracker.lock().update(&outcome.regions);
        if !self.auto_translate {
            return;
        }
        for region in fresh {
            self.enqueue(region);
        }
    }

    fn enqueue(&self, region: TextRegion) {
        if self.jobs.send(WorkerMessage::Translate(region)).is_ok() {
            self.counters.translations_queued.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// A running capture → recognize → translate loop for one window
pub struct TranslatorSession {
    shared: Arc<SessionShared>,
    orchestrator: Arc<TranslationOrchestrator>,
    events: Receiver<SessionEvent>,
    tick_interval: Duration,
    stop: Option<Sender<()>>,
    tick_handle: Option<JoinHandle<()>>,
    worker_handle: Option<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
}

impl TranslatorSession {
    /// Create a session and start its translation worker. Periodic ticking
    /// begins with [`TranslatorSession::start`].
    pub fn new(
        window: WindowHandle,
        source: Box<dyn FrameSource>,
        pipeline: RecognitionPipeline,
        orchestrator: Arc<TranslationOrchestrator>,
        config: SessionConfig,
    ) -> Result<Self> {
        let (job_tx, job_rx) = unbounded();
        let (event_tx, event_rx) = unbounded();
        let shutdown = pipeline.shutdown_handle();

        let worker_orchestrator = orchestrator.clone();
        let worker_events = event_tx.clone();
        let worker_shutdown = shutdown.clone();
        let worker_handle = std::thread::Builder::new()
            .name("translation".to_string())
            .spawn(move || {
                info!("Translation worker starting...");
                for message in job_rx.iter() {
                    // Queued regions are abandoned once the session goes away
                    if worker_shutdown.load(Ordering::SeqCst) {
                        let pending = job_rx.len();
                        if pending > 0 {
                            debug!("Discarding {} queued translation(s)", pending);
                        }
                        break;
                    }
                    let region = match message {
                        WorkerMessage::Translate(region) => region,
                        WorkerMessage::Shutdown => break,
                    };
                    let outcome = worker_orchestrator.translate_auto(&region.text);
                    if worker_events
                        .send(SessionEvent::TranslationReady { region, outcome })
                        .is_err()
                    {
                        break;
                    }
                }
                info!("Translation worker exiting...");
            })
            .context("Failed to spawn translation worker")?;

        let shared = Arc::new(SessionShared {
            window,
            source: Mutex::new(source),
            pipeline: Mutex::new(pipeline),
            tracker: Mutex::new(RegionTracker::new(
                config.similar_distance_px,
                config.text_similarity,
            )),
            auto_translate: config.auto_translate,
            jobs: job_tx,
            events: event_tx,
            counters: Counters::default(),
        });

        Ok(Self {
            shared,
            orchestrator,
            events: event_rx,
            tick_interval: config.tick_interval,
            stop: None,
            tick_handle: None,
            worker_handle: Some(worker_handle),
            shutdown,
        })
    }

    /// Start periodic ticking. Calling it on a running session does nothing.
    pub fn start(&mut self) -> Result<()> {
        if self.tick_handle.is_some() {
            return Ok(());
        }

        let (stop_tx, stop_rx) = unbounded::<()>();
        let shared = self.shared.clone();
        let interval = self.tick_interval;

        let handle = std::thread::Builder::new()
            .name("session-tick".to_string())
            .spawn(move || {
                info!("Session ticking every {:?}", interval);
                let ticker = tick(interval);
                loop {
                    select! {
                        recv(stop_rx) -> _ => break,
                        recv(ticker) -> _ => {
                            shared.tick();
                        }
                    }
                }
                info!("Session tick thread exiting...");
            })
            .context("Failed to spawn session tick thread")?;

        self.stop = Some(stop_tx);
        self.tick_handle = Some(handle);
        Ok(())
    }

    /// Stop periodic ticking, leaving manual actions available
    pub fn stop(&mut self) {
        self.stop.take();
        if let Some(handle) = self.tick_handle.take() {
            if handle.join().is_err() {
                error!("Session tick thread panicked");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.tick_handle
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// One periodic tick; skipped when another tick holds the pipeline
    pub fn tick(&self) -> TickResult {
        self.shared.tick()
    }

    /// Capture and recognize now, waiting for any running tick to finish
    pub fn recognize_now(&self) -> Result<RecognitionOutcome, CaptureError> {
        let mut pipeline = self.shared.pipeline.lock();
        self.shared.run(&mut pipeline)
    }

    /// Queue a region for translation regardless of whether it was seen before
    pub fn translate_region(&self, region: TextRegion) {
        self.shared.enqueue(region);
    }

    /// Translate text synchronously on the caller's thread
    pub fn translate_text(&self, text: &str) -> TranslationOutcome {
        self.orchestrator.translate_auto(text)
    }

    /// Re-apply a stored recognition profile
    pub fn apply_settings(&self, settings: &OptimalSettings) {
        self.shared.pipeline.lock().apply_settings(settings);
    }

    /// Events published by ticks and the translation worker
    pub fn events(&self) -> &Receiver<SessionEvent> {
        &self.events
    }

    pub fn orchestrator(&self) -> &Arc<TranslationOrchestrator> {
        &self.orchestrator
    }

    pub fn stats(&self) -> SessionStats {
        let c = &self.shared.counters;
        SessionStats {
            ticks: c.ticks.load(Ordering::Relaxed),
            skipped_ticks: c.skipped_ticks.load(Ordering::Relaxed),
            capture_failures: c.capture_failures.load(Ordering::Relaxed),
            translations_queued: c.translations_queued.load(Ordering::Relaxed),
        }
    }
}

impl Drop for TranslatorSession {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.stop();

        let _ = self.shared.jobs.send(WorkerMessage::Shutdown);
        if let Some(handle) = self.worker_handle.take() {
            if handle.join().is_err() {
                error!("Translation worker panicked");
            }
        }
    }
}

/// Build the recognition pipeline for `config`, running `recognizer` behind a
/// timeout-enforcing worker thread
pub fn build_pipeline(config: &AppConfig, recognizer: Box<dyn Recognizer>) -> RecognitionPipeline {
    let recognition = &config.recognition;
    let worker = RecognizerWorker::spawn(recognizer, Duration::from_millis(recognition.timeout_ms));
    RecognitionPipeline::new(
        Box::new(worker),
        ChangeDetector::new(config.change.clone()),
        PreprocessSelector::new(PreprocessingPreset::default_ladder()),
        Arc::new(RecognitionCache::with_hash_grid(
            recognition.cache_capacity,
            recognition.hash_grid,
        )),
        recognition.clone(),
    )
}

/// Build the translation orchestrator with the configured HTTP engines
pub fn build_orchestrator(settings: &TranslationSettings) -> TranslationOrchestrator {
    let engine = |c| Box::new(HttpTranslationEngine::new(c)) as Box<dyn TranslationEngine>;

    let orchestrator = TranslationOrchestrator::new(
        settings.primary.clone().map(engine),
        Arc::new(TranslationCache::new(settings.cache_capacity)),
        Box::new(ScriptDetector::new()),
        Arc::new(StaticLicense::new(settings.licensed_features.iter().cloned())),
        settings.languages.clone(),
    );
    orchestrator.set_fallback(settings.fallback.clone().map(engine));
    orchestrator
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::Frame;
    use crate::translation::testing::{FakeEngine, FixedDetector};
    use crate::translation::LanguageSettings;
    use crate::vision::testing::{region, ScriptedRecognizer};
    use crate::vision::{ChangeConfig, PipelineConfig, Rect};
    use std::collections::VecDeque;
    use std::time::Instant;

    /// Hands out queued frames, then reports the window as closed
    struct QueuedSource {
        frames: Arc<Mutex<VecDeque<Frame>>>,
    }

    impl FrameSource for QueuedSource {
        fn capture(&mut self, window: &WindowHandle) -> Result<Frame, CaptureError> {
            self.frames
                .lock()
                .pop_front()
                .ok_or_else(|| CaptureError::WindowClosed(window.clone()))
        }
    }

    struct Harness {
        session: TranslatorSession,
        recognizer: ScriptedRecognizer,
        frames: Arc<Mutex<VecDeque<Frame>>>,
        engine_log: crate::translation::testing::EngineLog,
    }

    fn harness(auto_translate: bool) -> Harness {
        harness_with_engine(auto_translate, FakeEngine::new("fake"))
    }

    fn harness_with_engine(auto_translate: bool, engine: FakeEngine) -> Harness {
        let recognizer = ScriptedRecognizer::new();
        let pipeline = RecognitionPipeline::new(
            Box::new(recognizer.clone()),
            ChangeDetector::new(ChangeConfig::default()),
            PreprocessSelector::new(PreprocessingPreset::default_ladder()),
            Arc::new(RecognitionCache::new(10)),
            PipelineConfig::default(),
        );

        let engine_log = engine.log.clone();
        let orchestrator = Arc::new(TranslationOrchestrator::new(
            Some(Box::new(engine)),
            Arc::new(TranslationCache::new(10)),
            Box::new(FixedDetector("en")),
            Arc::new(StaticLicense::default()),
            LanguageSettings::default(),
        ));

        let frames = Arc::new(Mutex::new(VecDeque::new()));
        let session = TranslatorSession::new(
            WindowHandle::new("game"),
            Box::new(QueuedSource {
                frames: frames.clone(),
            }),
            pipeline,
            orchestrator,
            SessionConfig {
                tick_interval: Duration::from_millis(10),
                auto_translate,
                ..Default::default()
            },
        )
        .unwrap();

        Harness {
            session,
            recognizer,
            frames,
            engine_log,
        }
    }

    fn next_event(session: &TranslatorSession) -> SessionEvent {
        session
            .events()
            .recv_timeout(Duration::from_secs(5))
            .expect("event")
    }

    fn text_region(text: &str, x: u32) -> TextRegion {
        TextRegion::new(text, Rect::new(x, 10, 40, 12), 0.9)
    }

    #[test]
    fn test_tracker_skips_same_text_nearby() {
        let mut tracker = RegionTracker::new(10.0, 0.9);

        let fresh = tracker.update(&[text_region("HP 100", 10), text_region("Inventory", 200)]);
        assert_eq!(fresh.len(), 2);

        // Jittered by a few pixels
        let fresh = tracker.update(&[text_region("HP 100", 13), text_region("Inventory", 200)]);
        assert!(fresh.is_empty());

        // Same place, different text
        let fresh = tracker.update(&[text_region("HP 99", 13), text_region("Inventory", 200)]);
        assert_eq!(fresh.len(), 1);
        assert_eq!(fresh[0].text, "HP 99");

        // Same text, moved away
        let fresh = tracker.update(&[text_region("HP 99", 100)]);
        assert_eq!(fresh.len(), 1);
        assert_eq!(tracker.len(), 1);

        tracker.clear();
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_tracker_tolerates_minor_ocr_noise() {
        let mut tracker = RegionTracker::new(10.0, 0.9);
        tracker.update(&[text_region("Press any button to continue", 10)]);
        let fresh = tracker.update(&[text_region("Press any buttón to continue", 10)]);
        assert!(fresh.is_empty());
    }

    #[test]
    fn test_recognize_now_publishes_and_translates() {
        let h = harness(true);
        h.frames.lock().push_back(Frame::solid(64, 64, [0, 0, 0, 255]));
        h.recognizer.push(Ok(vec![region("Start Game", 4, 4)]));

        let outcome = h.session.recognize_now().unwrap();
        assert!(outcome.has_text());

        match next_event(&h.session) {
            SessionEvent::RegionsDetected { regions, source } => {
                assert_eq!(regions.len(), 1);
                assert_eq!(source, RegionSource::Recognized { attempts: 1 });
            }
            other => panic!("unexpected event {:?}", other),
        }
        match next_event(&h.session) {
            SessionEvent::TranslationReady { region, outcome } => {
                assert_eq!(region.text, "Start Game");
                assert_eq!(outcome.text(), "[fake:en->ja] Start Game");
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert_eq!(h.session.stats().translations_queued, 1);
    }

    #[test]
    fn test_unchanged_frame_is_not_translated_again() {
        let h = harness(true);
        {
            let mut frames = h.frames.lock();
            frames.push_back(Frame::solid(64, 64, [0, 0, 0, 255]));
            frames.push_back(Frame::solid(64, 64, [0, 0, 0, 255]));
        }
        h.recognizer.push(Ok(vec![region("Start Game", 4, 4)]));

        h.session.recognize_now().unwrap();
        let second = h.session.recognize_now().unwrap();
        assert!(!second.ran_recognizer());
        assert_eq!(h.recognizer.call_count(), 1);

        // RegionsDetected, TranslationReady, RegionsDetected
        let mut translations = 0;
        for _ in 0..3 {
            if let SessionEvent::TranslationReady { .. } = next_event(&h.session) {
                translations += 1;
            }
        }
        assert_eq!(translations, 1);
        assert_eq!(h.session.stats().translations_queued, 1);
    }

    #[test]
    fn test_no_auto_translate_but_manual_request() {
        let h = harness(false);
        h.frames.lock().push_back(Frame::solid(64, 64, [0, 0, 0, 255]));
        h.recognizer.push(Ok(vec![region("Options", 4, 4)]));

        h.session.recognize_now().unwrap();
        assert!(matches!(
            next_event(&h.session),
            SessionEvent::RegionsDetected { .. }
        ));
        assert_eq!(h.session.stats().translations_queued, 0);

        h.session.translate_region(region("Options", 4, 4));
        match next_event(&h.session) {
            SessionEvent::TranslationReady { outcome, .. } => assert!(outcome.is_success()),
            other => panic!("unexpected event {:?}", other),
        }
        assert_eq!(h.engine_log.translate_calls(), 1);
    }

    #[test]
    fn test_exhausted_tick_reports_no_regions() {
        let h = harness(true);
        h.frames.lock().push_back(Frame::solid(64, 64, [0, 0, 0, 255]));

        let outcome = h.session.recognize_now().unwrap();
        assert_eq!(outcome.source, RegionSource::Exhausted { attempts: 3 });
        assert!(matches!(
            next_event(&h.session),
            SessionEvent::NoRegions {
                source: RegionSource::Exhausted { .. }
            }
        ));
    }

    #[test]
    fn test_capture_failure_is_an_event() {
        let h = harness(true);
        assert!(matches!(h.session.tick(), TickResult::CaptureFailed));
        assert!(matches!(
            next_event(&h.session),
            SessionEvent::CaptureFailed { .. }
        ));
        assert_eq!(h.session.stats().capture_failures, 1);
        assert_eq!(h.recognizer.call_count(), 0);
    }

    #[test]
    fn test_tick_is_skipped_while_pipeline_busy() {
        let h = harness(true);
        h.frames.lock().push_back(Frame::solid(64, 64, [0, 0, 0, 255]));

        let guard = h.session.shared.pipeline.lock();
        assert!(matches!(h.session.tick(), TickResult::Skipped));
        drop(guard);

        let stats = h.session.stats();
        assert_eq!(stats.ticks, 1);
        assert_eq!(stats.skipped_ticks, 1);
        // The frame is still there for the next tick
        assert_eq!(h.frames.lock().len(), 1);
        assert!(matches!(h.session.tick(), TickResult::Completed(_)));
    }

    #[test]
    fn test_periodic_ticks_run_until_stopped() {
        let mut h = harness(true);
        {
            let mut frames = h.frames.lock();
            for _ in 0..3 {
                frames.push_back(Frame::solid(64, 64, [0, 0, 0, 255]));
            }
        }
        h.recognizer.push(Ok(vec![region("Quest Log", 4, 4)]));

        h.session.start().unwrap();
        assert!(h.session.is_running());

        let deadline = Instant::now() + Duration::from_secs(5);
        let mut detected = false;
        while Instant::now() < deadline && !detected {
            if let Ok(SessionEvent::RegionsDetected { .. }) =
                h.session.events().recv_timeout(Duration::from_millis(100))
            {
                detected = true;
            }
        }
        assert!(detected);

        h.session.stop();
        assert!(!h.session.is_running());
        assert!(h.session.stats().ticks >= 1);
    }

    #[test]
    fn test_apply_settings_reaches_pipeline() {
        let h = harness(true);
        let settings = OptimalSettings::new(0.8, PreprocessingPreset::upscaled());
        h.session.apply_settings(&settings);

        let pipeline = h.session.shared.pipeline.lock();
        assert!((pipeline.confidence_threshold() - 0.8).abs() < 1e-6);
        assert_eq!(pipeline.selector().current().name, "upscaled");
    }

    #[test]
    fn test_translate_text_is_synchronous() {
        let h = harness(true);
        let outcome = h.session.translate_text("Continue");
        assert_eq!(outcome.text(), "[fake:en->ja] Continue");
    }

    #[test]
    fn test_drop_abandons_queued_translations() {
        let h = harness_with_engine(true, FakeEngine::slow("slow", Duration::from_millis(200)));
        for i in 0..15 {
            h.session.translate_region(text_region(&format!("Line {}", i), i * 50));
        }
        // Let the worker pick up the first region
        std::thread::sleep(Duration::from_millis(20));

        let started = Instant::now();
        drop(h.session);
        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(h.engine_log.translate_calls() <= 2);
    }

    #[test]
    fn test_build_from_config() {
        let mut config = AppConfig::default();
        config.translation.fallback = Some(crate::translation::HttpEngineConfig {
            name: "backup".to_string(),
            ..Default::default()
        });

        let orchestrator = build_orchestrator(&config.translation);
        assert_eq!(orchestrator.active_engine().as_deref(), Some("libretranslate"));
        assert_eq!(orchestrator.cache().capacity(), 1000);

        let pipeline = build_pipeline(&config, Box::new(ScriptedRecognizer::new()));
        assert!((pipeline.confidence_threshold() - 0.5).abs() < 1e-6);
        assert_eq!(pipeline.selector().len(), 5);

        config.capture.tick_interval_ms = 250;
        let session = SessionConfig::from_app_config(&config);
        assert_eq!(session.tick_interval, Duration::from_millis(250));
        assert!((session.text_similarity - 0.9).abs() < 1e-9);
    }
}
