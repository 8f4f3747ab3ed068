//! Run summary model
//!
//! Counters and timing for a batch or sub-tree of work units.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Aggregate counters and timing for a batch of work units.
///
/// Counters always sum. Time sums when the underlying work ran sequentially
/// and takes the maximum when it ran concurrently; the caller knows which
/// and picks [`RunSummary::aggregate`] or [`RunSummary::aggregate_concurrent`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub total: usize,
    pub failed: usize,
    pub skipped: usize,
    pub time: Duration,
}

impl RunSummary {
    pub fn passed(time: Duration) -> Self {
        Self {
            total: 1,
            failed: 0,
            skipped: 0,
            time,
        }
    }

    pub fn failed(time: Duration) -> Self {
        Self {
            total: 1,
            failed: 1,
            skipped: 0,
            time,
        }
    }

    pub fn skipped() -> Self {
        Self {
            total: 1,
            failed: 0,
            skipped: 1,
            time: Duration::ZERO,
        }
    }

    /// A summary where every one of `count` units failed without running.
    pub fn all_failed(count: usize) -> Self {
        Self {
            total: count,
            failed: count,
            skipped: 0,
            time: Duration::ZERO,
        }
    }

    /// Merge a summary that ran after this one.
    pub fn aggregate(&mut self, other: RunSummary) {
        self.total += other.total;
        self.failed += other.failed;
        self.skipped += other.skipped;
        self.time += other.time;
    }

    /// Merge a summary that ran alongside this one.
    pub fn aggregate_concurrent(&mut self, other: RunSummary) {
        self.total += other.total;
        self.failed += other.failed;
        self.skipped += other.skipped;
        self.time = self.time.max(other.time);
    }

    /// Number of units that neither failed nor were skipped.
    pub fn passed_count(&self) -> usize {
        self.total
            .saturating_sub(self.failed)
            .saturating_sub(self.skipped)
    }

    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    pub fn pass_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            (self.passed_count() as f64 / self.total as f64) * 100.0
        }
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Total: {} | Pass: {} | Fail: {} | Skip: {} | Duration: {}ms",
            self.total,
            self.passed_count(),
            self.failed,
            self.skipped,
            self.time.as_millis()
        )
    }
}
