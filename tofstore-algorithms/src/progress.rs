//! Progress reporting sinks.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Receives one report per completed unit of work.
///
/// Sinks are shared by all workers, so implementations must be `Sync`.
pub trait ProgressSink: Sync {
    /// Reports one completed unit.
    fn report(&self, message: &str);

    /// Reports `count` completed units at once.
    fn report_increment(&self, count: usize, message: &str) {
        for _ in 0..count {
            self.report(message);
        }
    }
}

/// Counts reports; useful for tests and simple front ends.
#[derive(Debug, Default)]
pub struct ProgressCounter {
    count: AtomicUsize,
    total: usize,
}

impl ProgressCounter {
    /// Creates a counter expecting `total` units.
    #[must_use]
    pub fn new(total: usize) -> Self {
        Self {
            count: AtomicUsize::new(0),
            total,
        }
    }

    /// Units reported so far.
    #[must_use]
    pub fn count(&self) -> usize {
        self.count.load(Ordering::Relaxed)
    }

    /// Fraction of the expected units reported, in `[0, 1]`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            return 1.0;
        }
        (self.count() as f64 / self.total as f64).min(1.0)
    }
}

impl ProgressSink for ProgressCounter {
    fn report(&self, _message: &str) {
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    fn report_increment(&self, count: usize, _message: &str) {
        self.count.fetch_add(count, Ordering::Relaxed);
    }
}

/// Logs a line at `info` level each time another tenth of the work is done.
#[derive(Debug)]
pub struct LogProgress {
    counter: ProgressCounter,
    step: usize,
}

impl LogProgress {
    /// Creates a logging sink expecting `total` units.
    #[must_use]
    pub fn new(total: usize) -> Self {
        Self {
            counter: ProgressCounter::new(total),
            step: (total / 10).max(1),
        }
    }
}

impl ProgressSink for LogProgress {
    fn report(&self, message: &str) {
        self.report_increment(1, message);
    }

    fn report_increment(&self, count: usize, message: &str) {
        let before = self.counter.count.fetch_add(count, Ordering::Relaxed);
        let after = before + count;
        if before / self.step != after / self.step {
            log::info!(
                "{message}: {after}/{} ({:.0}%)",
                self.counter.total,
                self.counter.fraction() * 100.0
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter() {
        let counter = ProgressCounter::new(4);
        counter.report("x");
        counter.report_increment(2, "x");
        assert_eq!(counter.count(), 3);
        assert!((counter.fraction() - 0.75).abs() < f64::EPSILON);
    }

    #[test]
    fn test_log_progress_counts() {
        let sink = LogProgress::new(100);
        sink.report_increment(55, "Sorting");
        sink.report("Sorting");
        assert_eq!(sink.counter.count(), 56);
    }
}
