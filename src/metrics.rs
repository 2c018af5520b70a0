//! Operation counters (SPEC_FULL.md §4.9), modeled on the teacher's
//! `db::metrics::PerformanceMetrics`.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Process-wide counters the facade can expose to an embedding application.
/// Not wired to any network surface — the core has none, per spec.md §1.
#[derive(Debug, Default)]
pub struct VfsMetrics {
    transactions_committed: AtomicU64,
    transactions_aborted: AtomicU64,
    events_emitted: AtomicU64,
}

impl VfsMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_commit(&self) {
        self.transactions_committed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_abort(&self) {
        self.transactions_aborted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_event(&self) {
        self.events_emitted.fetch_add(1, Ordering::Relaxed);
    }

    /// A point-in-time copy. `middleware_hook_invocations` is tracked inside
    /// [`crate::middleware::MiddlewareRegistry`] itself (local to its
    /// dispatch loop) and passed in by the caller rather than duplicated
    /// here.
    pub fn snapshot(&self, middleware_hook_invocations: u64) -> MetricsSnapshot {
        MetricsSnapshot {
            transactions_committed: self.transactions_committed.load(Ordering::Relaxed),
            transactions_aborted: self.transactions_aborted.load(Ordering::Relaxed),
            events_emitted: self.events_emitted.load(Ordering::Relaxed),
            middleware_hook_invocations,
        }
    }
}

/// Serializable snapshot of [`VfsMetrics`] at one instant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub transactions_committed: u64,
    /// Only counts transactions whose `commit()` call itself returned an
    /// error; a transaction that errors out before `commit()` is ever
    /// reached (a validation or middleware failure) is dropped without
    /// being counted here, since the engine never opens a try/abort guard
    /// around those paths — it just propagates the error and lets the
    /// transaction drop.
    pub transactions_aborted: u64,
    pub events_emitted: u64,
    pub middleware_hook_invocations: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_recorded_counts() {
        let metrics = VfsMetrics::new();
        metrics.record_commit();
        metrics.record_commit();
        metrics.record_abort();
        metrics.record_event();

        let snapshot = metrics.snapshot(7);
        assert_eq!(snapshot.transactions_committed, 2);
        assert_eq!(snapshot.transactions_aborted, 1);
        assert_eq!(snapshot.events_emitted, 1);
        assert_eq!(snapshot.middleware_hook_invocations, 7);
    }
}
