//! Shared run state: per-stage liveness counters, the error counter, and
//! the registry of distinct failures.
//!
//! Stages never talk to each other directly.  Each one decides whether to
//! keep going by reading these counters, so an error anywhere, or the end of
//! its upstream, is noticed without a coordinator.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use tracing::warn;

use crate::error::{AggregateFailure, Error, Origin, StageFailure, StageKind};
use crate::queue::lock;

// ── FailureRegistry ──────────────────────────────────────────────────────────

/// First-seen failures, one per [`Origin`].
#[derive(Debug, Default)]
pub struct FailureRegistry {
    failures: Vec<StageFailure>,
}

impl FailureRegistry {
    /// Keep `error` unless a failure with the same origin is already held.
    /// Returns whether it was kept.
    pub fn record(&mut self, stage: StageKind, error: Error) -> bool {
        let origin = Origin::of(stage, &error);
        if self.failures.iter().any(|f| f.origin == origin) {
            return false;
        }
        self.failures.push(StageFailure { origin, error });
        true
    }

    pub fn len(&self) -> usize {
        self.failures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn into_aggregate(self) -> AggregateFailure {
        AggregateFailure { failures: self.failures }
    }
}

// ── RunControl ───────────────────────────────────────────────────────────────

/// Liveness and failure state for one run.
#[derive(Debug)]
pub struct RunControl {
    readers:  AtomicUsize,
    workers:  AtomicUsize,
    writers:  AtomicUsize,
    errors:   AtomicUsize,
    registry: Mutex<FailureRegistry>,
}

impl RunControl {
    /// Counters start at the number of threads about to be spawned, so no
    /// stage can observe a neighbour as finished before it has started.
    pub fn new(workers: usize) -> Self {
        Self {
            readers:  AtomicUsize::new(1),
            workers:  AtomicUsize::new(workers),
            writers:  AtomicUsize::new(1),
            errors:   AtomicUsize::new(0),
            registry: Mutex::new(FailureRegistry::default()),
        }
    }

    fn counter(&self, stage: StageKind) -> &AtomicUsize {
        match stage {
            StageKind::Reader => &self.readers,
            StageKind::Worker => &self.workers,
            StageKind::Writer => &self.writers,
        }
    }

    /// Threads of `stage` still running.
    pub fn alive(&self, stage: StageKind) -> usize {
        self.counter(stage).load(Ordering::SeqCst)
    }

    /// Mark one `stage` thread as exited.  Returns how many remain.
    pub fn exited(&self, stage: StageKind) -> usize {
        self.counter(stage).fetch_sub(1, Ordering::SeqCst) - 1
    }

    /// True until the first failure is recorded.
    pub fn healthy(&self) -> bool {
        self.errors.load(Ordering::SeqCst) == 0
    }

    pub fn error_count(&self) -> usize {
        self.errors.load(Ordering::SeqCst)
    }

    /// Count a failure and keep it if its origin is new.
    pub fn record(&self, stage: StageKind, error: Error) {
        self.errors.fetch_add(1, Ordering::SeqCst);
        let message = error.to_string();
        let kept = lock(&self.registry).record(stage, error);
        warn!(stage = stage.name(), duplicate = !kept, "{message}");
    }

    /// Consume the control block once every thread has joined.
    pub fn into_failures(self) -> FailureRegistry {
        self.registry
            .into_inner()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
