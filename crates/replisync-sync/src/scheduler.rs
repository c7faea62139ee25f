//! Periodic pass scheduler
//!
//! The [`Scheduler`] drives a [`Reconciler`] forever: run a pass, wait, run
//! the next one. It is the only place where a failed pass is turned into
//! "log it and try again later".
//!
//! ## Flow
//!
//! ```text
//!   ┌──────────────┐  pass done/failed   ┌─────────┐
//!   │ RunningSync  │ ──────────────────→ │ Waiting │
//!   └──────────────┘ ←────────────────── └─────────┘
//!                      delay elapsed          │
//!                                             │ shutdown
//!                                             ▼
//!                                          stopped
//! ```
//!
//! Shutdown is only observed while waiting, so a pass is never interrupted
//! halfway through the tree.

use std::{
    sync::{
        atomic::{AtomicU32, AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use replisync_core::{
    domain::pass::{PassReport, SchedulerState},
    ports::sync_observer::ISyncObserver,
};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::{error::ReconcileError, reconciler::Reconciler};

// ============================================================================
// BackoffPolicy
// ============================================================================

/// How the wait between passes reacts to failures
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BackoffPolicy {
    /// Always wait exactly one interval, failed pass or not
    #[default]
    Fixed,
    /// Double the wait for each consecutive failure, up to `max`
    Exponential { max: Duration },
}

impl BackoffPolicy {
    /// Exponential when a cap is given, fixed otherwise
    pub fn from_cap(cap: Option<Duration>) -> Self {
        match cap {
            Some(max) => Self::Exponential { max },
            None => Self::Fixed,
        }
    }

    /// Wait before the next pass given the number of consecutive failures
    pub fn delay(&self, interval: Duration, consecutive_failures: u32) -> Duration {
        match *self {
            Self::Fixed => interval,
            Self::Exponential { max } => {
                if consecutive_failures == 0 {
                    return interval;
                }
                let factor = 1u32.checked_shl(consecutive_failures).unwrap_or(u32::MAX);
                interval.saturating_mul(factor).min(max.max(interval))
            }
        }
    }
}

// ============================================================================
// SchedulerStats
// ============================================================================

/// Snapshot of the scheduler counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub passes_succeeded: u64,
    pub passes_failed: u64,
    pub consecutive_failures: u32,
}

#[derive(Debug, Default)]
struct Counters {
    passes_succeeded: AtomicU64,
    passes_failed: AtomicU64,
    consecutive_failures: AtomicU32,
}

// ============================================================================
// Scheduler
// ============================================================================

/// Runs reconciliation passes at a fixed interval until told to stop
pub struct Scheduler {
    interval: Duration,
    backoff: BackoffPolicy,
    observer: Arc<dyn ISyncObserver>,
    state_tx: watch::Sender<SchedulerState>,
    counters: Counters,
}

impl Scheduler {
    pub fn new(
        interval: Duration,
        backoff: BackoffPolicy,
        observer: Arc<dyn ISyncObserver>,
    ) -> Self {
        info!(
            interval_secs = interval.as_secs(),
            backoff = ?backoff,
            "Creating sync scheduler"
        );

        let (state_tx, _) = watch::channel(SchedulerState::Waiting);
        Self {
            interval,
            backoff,
            observer,
            state_tx,
            counters: Counters::default(),
        }
    }

    /// Current state
    pub fn state(&self) -> SchedulerState {
        *self.state_tx.borrow()
    }

    /// Receiver that follows every state transition
    pub fn subscribe(&self) -> watch::Receiver<SchedulerState> {
        self.state_tx.subscribe()
    }

    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            passes_succeeded: self.counters.passes_succeeded.load(Ordering::Acquire),
            passes_failed: self.counters.passes_failed.load(Ordering::Acquire),
            consecutive_failures: self.counters.consecutive_failures.load(Ordering::Acquire),
        }
    }

    /// Wait before the next pass, based on the failures recorded so far
    pub fn next_delay(&self) -> Duration {
        self.backoff.delay(
            self.interval,
            self.counters.consecutive_failures.load(Ordering::Acquire),
        )
    }

    /// Runs a single pass and records its outcome
    ///
    /// The reconciler has already reported a failure to the observer by the
    /// time this returns it.
    pub async fn run_once(&self, reconciler: &Reconciler) -> Result<PassReport, ReconcileError> {
        self.state_tx.send_replace(SchedulerState::RunningSync);
        let outcome = reconciler.reconcile().await;

        match &outcome {
            Ok(report) => {
                self.counters.passes_succeeded.fetch_add(1, Ordering::AcqRel);
                self.counters.consecutive_failures.store(0, Ordering::Release);
                debug!(changed = report.has_changes(), "Pass recorded as succeeded");
            }
            Err(err) => {
                self.counters.passes_failed.fetch_add(1, Ordering::AcqRel);
                self.counters.consecutive_failures.fetch_add(1, Ordering::AcqRel);
                debug!(kind = ?err.kind(), "Pass recorded as failed");
            }
        }

        self.state_tx.send_replace(SchedulerState::Waiting);
        outcome
    }

    /// Runs passes forever, returning only once `shutdown` is cancelled
    ///
    /// A failed pass never ends the loop.
    pub async fn run_forever(&self, reconciler: &Reconciler, shutdown: CancellationToken) {
        info!("Sync scheduler starting");

        loop {
            // Outcome already logged and counted
            let _ = self.run_once(reconciler).await;

            let delay = self.next_delay();
            let failures = self.counters.consecutive_failures.load(Ordering::Acquire);
            self.observer.on_waiting(delay, failures);

            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.observer.on_scheduler_stopped();
    }
}
