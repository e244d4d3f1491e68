//! Off-thread scanner capture with a bounded deadline.
//!
//! Each physical scanner gets one worker thread which is the sole owner of its
//! driver, so captures on the same scanner never overlap. Callers queue a request
//! with a deadline and wait for the reply; if the deadline passes they get
//! `CaptureTimeout` and the worker drops the stale request instead of capturing.

use crate::error::RidgegateError;
use crate::scanner::{RawSample, ScannerDriver};
use crossbeam::channel::{bounded, Receiver, RecvTimeoutError, SendTimeoutError, Sender};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

struct CaptureRequest {
    deadline: Instant,
    reply: Sender<Result<RawSample, RidgegateError>>,
}

/// Counters of a scanner worker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureStats {
    /// Requests accepted into the queue
    pub requested: u64,
    /// Requests that ended in `CaptureTimeout` on the caller side
    pub timed_out: u64,
    /// Requests the worker discarded because their deadline had already passed
    pub skipped: u64,
}

#[derive(Default)]
struct Counters {
    requested: AtomicU64,
    timed_out: AtomicU64,
    skipped: AtomicU64,
}

/// Handle to a scanner running on its own worker thread.
///
/// Cheap to share behind an `Arc` between per-request service instances.
pub struct ScannerHandle {
    name: String,
    requests: Sender<CaptureRequest>,
    timeout: Duration,
    counters: Arc<Counters>,
    _worker: thread::JoinHandle<()>,
}

impl ScannerHandle {
    /// Initializes `driver` and moves it onto a dedicated worker thread.
    ///
    /// # Parameters
    /// - `name`: Scanner name, used for the thread name and logs
    /// - `driver`: The scanner driver; initialized before the thread starts
    /// - `timeout`: Deadline applied to every capture
    /// - `queue_size`: Number of capture requests that may wait for the scanner
    ///
    /// # Errors
    /// Returns `Capture` if initialization fails, and `Configuration` for a zero
    /// timeout or a failed thread spawn.
    pub fn spawn<D>(
        name: &str,
        mut driver: D,
        timeout: Duration,
        queue_size: usize,
    ) -> Result<Self, RidgegateError>
    where
        D: ScannerDriver + 'static,
    {
        if timeout.is_zero() {
            return Err(RidgegateError::Configuration(
                "capture timeout must be greater than 0".to_string(),
            ));
        }

        driver.initialize()?;

        let (tx, rx) = bounded::<CaptureRequest>(queue_size.max(1));
        let counters = Arc::new(Counters::default());
        let worker_counters = Arc::clone(&counters);
        let worker_name = name.to_string();

        let worker = thread::Builder::new()
            .name(format!("scanner-{name}"))
            .spawn(move || Self::worker_loop(&worker_name, driver, rx, worker_counters))
            .map_err(|e| {
                RidgegateError::Configuration(format!("Failed to spawn scanner worker: {e}"))
            })?;

        debug!("Scanner {} ready, capture timeout {:?}", name, timeout);

        Ok(Self { name: name.to_string(), requests: tx, timeout, counters, _worker: worker })
    }

    fn worker_loop<D: ScannerDriver>(
        name: &str,
        mut driver: D,
        rx: Receiver<CaptureRequest>,
        counters: Arc<Counters>,
    ) {
        while let Ok(request) = rx.recv() {
            let now = Instant::now();
            if now >= request.deadline {
                counters.skipped.fetch_add(1, Ordering::Relaxed);
                debug!("Scanner {}: dropping capture request past its deadline", name);
                continue;
            }

            let result = driver.capture_sample(request.deadline - now);
            if let Err(ref e) = result {
                debug!("Scanner {}: capture failed: {}", name, e);
            }
            if request.reply.send(result).is_err() {
                debug!("Scanner {}: requester gone, discarding sample", name);
            }
        }

        debug!("Scanner {} worker exiting", name);
    }

    /// Captures one sample, waiting at most the configured timeout overall,
    /// including time spent queued behind other captures.
    pub fn capture(&self) -> Result<RawSample, RidgegateError> {
        let deadline = Instant::now() + self.timeout;
        let (reply_tx, reply_rx) = bounded(1);

        match self.requests.send_deadline(CaptureRequest { deadline, reply: reply_tx }, deadline) {
            Ok(()) => {
                self.counters.requested.fetch_add(1, Ordering::Relaxed);
            }
            Err(SendTimeoutError::Timeout(_)) => {
                self.counters.timed_out.fetch_add(1, Ordering::Relaxed);
                warn!("Scanner {}: busy until capture deadline", self.name);
                return Err(RidgegateError::CaptureTimeout(self.timeout));
            }
            Err(SendTimeoutError::Disconnected(_)) => {
                return Err(RidgegateError::Capture(format!(
                    "scanner {} worker stopped",
                    self.name
                )));
            }
        }

        match reply_rx.recv_deadline(deadline) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                self.counters.timed_out.fetch_add(1, Ordering::Relaxed);
                warn!("Scanner {}: capture timed out after {:?}", self.name, self.timeout);
                Err(RidgegateError::CaptureTimeout(self.timeout))
            }
            Err(RecvTimeoutError::Disconnected) => {
                // Worker dropped the request unanswered, which only happens past the deadline.
                self.counters.timed_out.fetch_add(1, Ordering::Relaxed);
                Err(RidgegateError::CaptureTimeout(self.timeout))
            }
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stats(&self) -> CaptureStats {
        CaptureStats {
            requested: self.counters.requested.load(Ordering::Relaxed),
            timed_out: self.counters.timed_out.load(Ordering::Relaxed),
            skipped: self.counters.skipped.load(Ordering::Relaxed),
        }
    }
}
