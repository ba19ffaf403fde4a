//! Retention driven removal of stored uploads.
//!
//! The worker sweeps once when started and then on every tick of a
//! monotonic interval until stopped. What a sweep removes is decided by the
//! backend: whole handles on local disk, single objects on a remote store.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use fastrace::prelude::*;
use serde::Serialize;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::storage::{StorageBackend, StorageError, SweepReport};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct RetentionPolicy {
    pub retention_seconds: i64,
    pub interval_seconds: i64,
}

impl RetentionPolicy {
    pub fn new(retention_seconds: i64, interval_seconds: i64) -> Self {
        RetentionPolicy { retention_seconds, interval_seconds }
    }

    /// A non-positive retention or interval turns cleanup off.
    pub fn is_enabled(&self) -> bool {
        self.retention_seconds > 0 && self.interval_seconds > 0
    }

    pub fn interval(&self) -> Option<std::time::Duration> {
        u64::try_from(self.interval_seconds)
            .ok()
            .filter(|_| self.is_enabled())
            .map(std::time::Duration::from_secs)
    }

    /// Anything last modified at or before the cutoff is expired. A retention
    /// beyond the representable time range expires nothing.
    pub fn cutoff(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if !self.is_enabled() {
            return None;
        }

        let cutoff = chrono::Duration::try_seconds(self.retention_seconds)
            .and_then(|retention| now.checked_sub_signed(retention))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);

        Some(cutoff)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkerState {
    Disabled,
    Idle,
    Sweeping,
}

#[derive(Debug, PartialEq)]
pub enum SweepOutcome {
    Disabled,
    AlreadyRunning,
    Completed(SweepReport),
    Aborted(StorageError),
}

struct SweepGuard<'a>(&'a AtomicBool);

impl Drop for SweepGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct CleanupWorker {
    storage: Arc<dyn StorageBackend>,
    policy: RetentionPolicy,
    sweeping: AtomicBool,
}

impl CleanupWorker {
    pub fn new(storage: Arc<dyn StorageBackend>, policy: RetentionPolicy) -> Self {
        CleanupWorker { storage, policy, sweeping: AtomicBool::new(false) }
    }

    pub fn policy(&self) -> RetentionPolicy {
        self.policy
    }

    pub fn state(&self) -> WorkerState {
        if !self.policy.is_enabled() {
            WorkerState::Disabled
        } else if self.sweeping.load(Ordering::SeqCst) {
            WorkerState::Sweeping
        } else {
            WorkerState::Idle
        }
    }

    pub async fn run_once(&self) -> SweepOutcome {
        self.sweep_at(Utc::now()).await
    }

    /// Runs one sweep as if the current time were `now`. Only one sweep runs
    /// at a time; a concurrent call returns [SweepOutcome::AlreadyRunning].
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> SweepOutcome {
        let cutoff = match self.policy.cutoff(now) {
            Some(cutoff) => cutoff,
            None => return SweepOutcome::Disabled,
        };

        if self
            .sweeping
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            log::debug!("Cleanup sweep skipped, previous sweep still running");

            return SweepOutcome::AlreadyRunning;
        }
        let _guard = SweepGuard(&self.sweeping);

        let start = minstant::Instant::now();
        let result = self.storage.sweep_expired(cutoff).await;
        let elapsed_seconds = start.elapsed().as_secs_f64();

        match result {
            Ok(report) => {
                log::info!(
                    "Cleanup sweep of {} storage took {:.3}s: scanned {}, removed {}, failed {}",
                    self.storage.storage_type(),
                    elapsed_seconds,
                    report.scanned,
                    report.removed,
                    report.failed
                );

                SweepOutcome::Completed(report)
            }
            Err(e) => {
                log::error!(
                    "Cleanup sweep of {} storage aborted after {:.3}s: {}",
                    self.storage.storage_type(),
                    elapsed_seconds,
                    e
                );

                SweepOutcome::Aborted(e)
            }
        }
    }

    /// Spawns the periodic sweep. Returns `None`, after logging why, when the
    /// policy disables cleanup.
    pub fn start(self) -> Option<CleanupHandle> {
        let interval = match self.policy.interval() {
            Some(interval) => interval,
            None => {
                log::info!(
                    "Cleanup worker disabled, retention {}s, interval {}s",
                    self.policy.retention_seconds,
                    self.policy.interval_seconds
                );

                return None;
            }
        };

        log::info!(
            "Cleanup worker started. Interval: {}s, retention: {}s, storage: {}",
            self.policy.interval_seconds,
            self.policy.retention_seconds,
            self.storage.storage_type()
        );

        let worker = Arc::new(self);
        let (shutdown, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(run(worker.clone(), interval, shutdown_rx));

        Some(CleanupHandle { worker, shutdown, task })
    }
}

/// Sweeps on every tick; the first tick fires immediately.
async fn run(
    worker: Arc<CleanupWorker>,
    interval: std::time::Duration,
    mut shutdown: oneshot::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                log::info!("Stopping cleanup worker");
                break;
            }
            _ = ticker.tick() => {
                worker
                    .run_once()
                    .in_span(Span::root("cleanup::sweep", SpanContext::random()))
                    .await;
            }
        }
    }
}

pub struct CleanupHandle {
    worker: Arc<CleanupWorker>,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl CleanupHandle {
    pub fn state(&self) -> WorkerState {
        self.worker.state()
    }

    /// Stops the timer and waits for a running sweep to finish.
    pub async fn stop(self) {
        // the receiver is gone only if the task already ended
        let _ = self.shutdown.send(());

        if let Err(e) = self.task.await {
            log::error!("Cleanup worker ended abnormally: {:?}", e);
        }
    }
}
