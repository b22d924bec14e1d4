use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide run counters behind an explicit interface.
///
/// Incremented by the orchestrator, read by anyone holding a reference via
/// [`snapshot`](Metrics::snapshot). Deliberately not ambient global state.
#[derive(Debug, Default)]
pub struct Metrics {
    started: AtomicU64,
    suspended: AtomicU64,
    resumed: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    cancelled: AtomicU64,
    gates_requested: AtomicU64,
    gates_approved: AtomicU64,
    gates_rejected: AtomicU64,
}

impl Metrics {
    pub(crate) fn invocation_started(&self) {
        self.started.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn invocation_suspended(&self) {
        self.suspended.fetch_add(1, Ordering::Relaxed);
        self.gates_requested.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn invocation_resumed(&self, decision: bool) {
        self.resumed.fetch_add(1, Ordering::Relaxed);
        if decision {
            self.gates_approved.fetch_add(1, Ordering::Relaxed);
        } else {
            self.gates_rejected.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn invocation_completed(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn invocation_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn invocation_cancelled(&self) {
        self.cancelled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            started: self.started.load(Ordering::Relaxed),
            suspended: self.suspended.load(Ordering::Relaxed),
            resumed: self.resumed.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
            gates_requested: self.gates_requested.load(Ordering::Relaxed),
            gates_approved: self.gates_approved.load(Ordering::Relaxed),
            gates_rejected: self.gates_rejected.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    pub started: u64,
    pub suspended: u64,
    pub resumed: u64,
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,
    pub gates_requested: u64,
    pub gates_approved: u64,
    pub gates_rejected: u64,
}
