//! Progress reporting for long-running operations.
//!
//! Long-running helpers accept an `Arc<dyn ProgressSink<P>>` and push
//! reports as work advances; callers choose what to do with them.

use parking_lot::Mutex;
use std::fmt::Debug;
use tracing::debug;

/// A consumer of progress reports.
pub trait ProgressSink<P>: Send + Sync {
    /// Receives one progress report.
    fn report(&self, progress: P);
}

/// Discards every report.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpProgressSink;

impl<P> ProgressSink<P> for NoOpProgressSink {
    fn report(&self, _progress: P) {}
}

/// Collects reports in arrival order, for tests and diagnostics.
#[derive(Debug, Default)]
pub struct CollectingProgressSink<P> {
    reports: Mutex<Vec<P>>,
}

impl<P: Send> CollectingProgressSink<P> {
    /// Creates an empty collecting sink.
    #[must_use]
    pub fn new() -> Self {
        Self {
            reports: Mutex::new(Vec::new()),
        }
    }

    /// Returns the reports received so far.
    #[must_use]
    pub fn reports(&self) -> Vec<P>
    where
        P: Clone,
    {
        self.reports.lock().clone()
    }

    /// Returns the number of reports received.
    #[must_use]
    pub fn len(&self) -> usize {
        self.reports.lock().len()
    }

    /// Whether no reports have been received.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.reports.lock().is_empty()
    }
}

impl<P: Send> ProgressSink<P> for CollectingProgressSink<P> {
    fn report(&self, progress: P) {
        self.reports.lock().push(progress);
    }
}

/// Logs each report at debug level.
#[derive(Debug, Clone)]
pub struct LoggingProgressSink {
    label: String,
}

impl LoggingProgressSink {
    /// Creates a logging sink with a label included in each line.
    #[must_use]
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
        }
    }
}

impl<P: Debug> ProgressSink<P> for LoggingProgressSink {
    fn report(&self, progress: P) {
        debug!(label = %self.label, ?progress, "progress");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collecting_sink_keeps_arrival_order() {
        let sink = CollectingProgressSink::new();
        sink.report(1u64);
        sink.report(2);
        sink.report(3);

        assert_eq!(sink.reports(), vec![1, 2, 3]);
        assert_eq!(sink.len(), 3);
        assert!(!sink.is_empty());
    }

    #[test]
    fn test_noop_sink_accepts_any_payload() {
        let sink = NoOpProgressSink;
        sink.report("anything");
        sink.report(42u32);
    }

    #[test]
    fn test_logging_sink_does_not_panic() {
        let sink = LoggingProgressSink::new("test");
        sink.report(7u64);
    }
}
