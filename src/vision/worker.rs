//! Recognizer worker thread with per-call timeouts
//!
//! A recognition backend that hangs must not stall the pipeline. The worker
//! owns the real recognizer on its own thread; callers wait on the reply
//! channel with a deadline and treat an expired deadline as a failed
//! attempt. Replies that arrive after their deadline are discarded, and jobs
//! whose deadline has already passed are dropped without running them.

use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use tracing::{debug, info, warn};

use crate::capture::Frame;
use crate::vision::{PreprocessingPreset, RecognitionError, Recognizer, TextRegion};

enum Job {
    Initialize,
    Detect {
        frame: Frame,
        threshold: f32,
        preset: PreprocessingPreset,
    },
}

/// A queued job and the instant its caller stops waiting for it
struct Envelope {
    id: u64,
    deadline: Instant,
    job: Job,
}

enum Reply {
    Initialized(Result<(), RecognitionError>),
    Regions(Result<Vec<TextRegion>, RecognitionError>),
}

/// Runs a [`Recognizer`] on a dedicated thread and enforces a call timeout
pub struct RecognizerWorker {
    jobs: Option<Sender<Envelope>>,
    replies: Receiver<(u64, Reply)>,
    timeout: Duration,
    next_id: u64,
    handle: Option<JoinHandle<()>>,
}

impl RecognizerWorker {
    pub fn spawn<R>(mut recognizer: R, timeout: Duration) -> Self
    where
        R: Recognizer + 'static,
    {
        let (job_tx, job_rx) = unbounded::<Envelope>();
        let (reply_tx, reply_rx) = unbounded();

        let handle = std::thread::Builder::new()
            .name("recognizer".to_string())
            .spawn(move || {
                info!("Recognizer worker starting...");
                for Envelope { id, deadline, job } in job_rx {
                    if Instant::now() >= deadline {
                        debug!("Skipping expired recognizer job #{}", id);
                        continue;
                    }
                    let reply = match job {
                        Job::Initialize => Reply::Initialized(recognizer.initialize()),
                        Job::Detect {
                            frame,
                            threshold,
                            preset,
                        } => Reply::Regions(recognizer.detect_regions(&frame, threshold, &preset)),
                    };
                    if reply_tx.send((id, reply)).is_err() {
                        break;
                    }
                }
                info!("Recognizer worker exiting...");
            })
            .map_err(|e| warn!("Failed to spawn recognizer worker: {}", e))
            .ok();

        Self {
            jobs: Some(job_tx),
            replies: reply_rx,
            timeout,
            next_id: 0,
            handle,
        }
    }

    fn call(&mut self, job: Job) -> Result<Reply, RecognitionError> {
        if self.handle.is_none() {
            return Err(RecognitionError::Shutdown);
        }
        let jobs = self.jobs.as_ref().ok_or(RecognitionError::Shutdown)?;

        self.next_id += 1;
        let id = self.next_id;
        let deadline = Instant::now() + self.timeout;
        jobs.send(Envelope { id, deadline, job })
            .map_err(|_| RecognitionError::Shutdown)?;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.replies.recv_timeout(remaining) {
                Ok((reply_id, reply)) if reply_id == id => return Ok(reply),
                Ok((stale_id, _)) => {
                    debug!("Discarding late recognizer reply #{}", stale_id);
                }
                Err(RecvTimeoutError::Timeout) => {
                    warn!("Recognizer call #{} timed out after {:?}", id, self.timeout);
                    return Err(RecognitionError::Timeout(self.timeout.as_millis() as u64));
                }
                Err(RecvTimeoutError::Disconnected) => return Err(RecognitionError::Shutdown),
            }
        }
    }
}

impl Recognizer for RecognizerWorker {
    fn initialize(&mut self) -> Result<(), RecognitionError> {
        match self.call(Job::Initialize)? {
            Reply::Initialized(result) => result,
            Reply::Regions(_) => Err(RecognitionError::Backend("unexpected reply".to_string())),
        }
    }

    fn detect_regions(
        &mut self,
        frame: &Frame,
        confidence_threshold: f32,
        preset: &PreprocessingPreset,
    ) -> Result<Vec<TextRegion>, RecognitionError> {
        let job = Job::Detect {
            frame: frame.clone(),
            threshold: confidence_threshold,
            preset: preset.clone(),
        };
        match self.call(job)? {
            Reply::Regions(result) => result,
            Reply::Initialized(_) => Err(RecognitionError::Backend("unexpected reply".to_string())),
        }
    }
}

impl Drop for RecognizerWorker {
    fn drop(&mut self) {
        // Closing the job channel ends the worker loop. A backend stuck in a
        // call is left to finish on its own rather than blocking the drop.
        self.jobs.take();
        if let Some(handle) = self.handle.take() {
            if handle.is_finished() {
                let _ = handle.join();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vision::testing::{region, ScriptedRecognizer};
    use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Clone)]
    struct SlowRecognizer {
        delay_ms: Arc<AtomicU64>,
        detections: Arc<AtomicUsize>,
    }

    impl SlowRecognizer {
        fn new(delay_ms: u64) -> Self {
            Self {
                delay_ms: Arc::new(AtomicU64::new(delay_ms)),
                detections: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    impl Recognizer for SlowRecognizer {
        fn initialize(&mut self) -> Result<(), RecognitionError> {
            Ok(())
        }

        fn detect_regions(
            &mut self,
            _frame: &Frame,
            _confidence_threshold: f32,
            _preset: &PreprocessingPreset,
        ) -> Result<Vec<TextRegion>, RecognitionError> {
            self.detections.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(self.delay_ms.load(Ordering::SeqCst)));
            Ok(vec![region("late", 0, 0)])
        }
    }

    #[test]
    fn test_forwards_calls() {
        let scripted = ScriptedRecognizer::new();
        scripted.push(Ok(vec![region("START", 5, 5)]));

        let mut worker = RecognizerWorker::spawn(scripted.clone(), Duration::from_secs(5));
        worker.initialize().unwrap();

        let frame = Frame::solid(8, 8, [0, 0, 0, 255]);
        let regions = worker
            .detect_regions(&frame, 0.4, &PreprocessingPreset::neutral())
            .unwrap();
        assert_eq!(regions[0].text, "START");

        let calls = scripted.calls();
        assert_eq!(calls.len(), 1);
        assert!((calls[0].threshold - 0.4).abs() < f32::EPSILON);
    }

    #[test]
    fn test_slow_call_times_out() {
        let mut worker = RecognizerWorker::spawn(SlowRecognizer::new(300), Duration::from_millis(50));

        let frame = Frame::solid(8, 8, [0, 0, 0, 255]);
        let result = worker.detect_regions(&frame, 0.5, &PreprocessingPreset::neutral());
        assert!(matches!(result, Err(RecognitionError::Timeout(50))));
    }

    #[test]
    fn test_late_reply_is_not_returned_for_next_call() {
        let mut worker = RecognizerWorker::spawn(SlowRecognizer::new(100), Duration::from_millis(20));
        let frame = Frame::solid(8, 8, [0, 0, 0, 255]);
        assert!(worker
            .detect_regions(&frame, 0.5, &PreprocessingPreset::neutral())
            .is_err());

        // Generous deadline: the stale reply for call #1 arrives first and must be skipped
        worker.timeout = Duration::from_secs(2);
        let regions = worker
            .detect_regions(&frame, 0.5, &PreprocessingPreset::neutral())
            .unwrap();
        assert_eq!(regions.len(), 1);
        assert_eq!(worker.next_id, 2);
    }

    #[test]
    fn test_recovers_after_slow_period() {
        let backend = SlowRecognizer::new(300);
        let mut worker = RecognizerWorker::spawn(backend.clone(), Duration::from_millis(20));
        let frame = Frame::solid(8, 8, [0, 0, 0, 255]);

        for _ in 0..10 {
            let result = worker.detect_regions(&frame, 0.5, &PreprocessingPreset::neutral());
            assert!(matches!(result, Err(RecognitionError::Timeout(20))));
        }

        backend.delay_ms.store(0, Ordering::SeqCst);
        worker.timeout = Duration::from_secs(1);
        let started = Instant::now();
        let regions = worker
            .detect_regions(&frame, 0.5, &PreprocessingPreset::neutral())
            .unwrap();

        assert_eq!(regions.len(), 1);
        assert!(started.elapsed() < Duration::from_millis(900));
        // Only the first slow job and the healthy one reached the backend
        assert_eq!(backend.detections.load(Ordering::SeqCst), 2);
    }
}
