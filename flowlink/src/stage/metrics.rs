//! Per-stage counters for monitoring intake and routing.

use std::sync::atomic::{AtomicU64, Ordering};

/// Metrics tracked by every stage.
#[derive(Debug, Default)]
pub struct StageMetrics {
    /// Items accepted into the input queue.
    accepted: AtomicU64,
    /// Items rejected at intake (terminal state or cancellation).
    rejected: AtomicU64,
    /// Items processed by the worker function.
    processed: AtomicU64,
    /// Worker outputs no outbound link accepted.
    dropped: AtomicU64,
    /// Faults recorded against the stage.
    faulted: AtomicU64,
}

impl StageMetrics {
    /// Records an accepted item.
    pub fn record_accepted(&self) {
        self.accepted.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a rejected item.
    pub fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a processed item.
    pub fn record_processed(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
    }

    /// Records an output dropped by routing.
    pub fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a fault report.
    pub fn record_faulted(&self) {
        self.faulted.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the number of accepted items.
    #[must_use]
    pub fn accepted(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed)
    }

    /// Returns the number of rejected items.
    #[must_use]
    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }

    /// Returns the number of processed items.
    #[must_use]
    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    /// Returns the number of dropped outputs.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Returns the number of fault reports.
    #[must_use]
    pub fn faulted(&self) -> u64 {
        self.faulted.load(Ordering::Relaxed)
    }

    /// Converts the counters to a JSON snapshot.
    #[must_use]
    pub fn snapshot(&self) -> serde_json::Value {
        serde_json::json!({
            "accepted": self.accepted(),
            "rejected": self.rejected(),
            "processed": self.processed(),
            "dropped": self.dropped(),
            "faulted": self.faulted(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let metrics = StageMetrics::default();
        metrics.record_accepted();
        metrics.record_accepted();
        metrics.record_processed();
        metrics.record_rejected();
        metrics.record_faulted();

        assert_eq!(metrics.accepted(), 2);
        assert_eq!(metrics.processed(), 1);
        assert_eq!(metrics.rejected(), 1);
        assert_eq!(metrics.dropped(), 0);
        assert_eq!(metrics.faulted(), 1);
    }

    #[test]
    fn test_snapshot() {
        let metrics = StageMetrics::default();
        metrics.record_accepted();
        metrics.record_dropped();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot["accepted"], 1);
        assert_eq!(snapshot["dropped"], 1);
        assert_eq!(snapshot["processed"], 0);
    }
}
