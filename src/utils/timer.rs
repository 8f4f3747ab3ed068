//! Timer utilities
//!
//! Accumulates the time spent in measured sections.

use std::future::Future;
use std::time::{Duration, Instant};

/// Accumulating timer for the sections of a unit of work.
#[derive(Debug, Default)]
pub struct ExecutionTimer {
    total: Duration,
}

impl ExecutionTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `action`, adding its duration to the total.
    pub fn measure<T>(&mut self, action: impl FnOnce() -> T) -> T {
        let start = Instant::now();
        let value = action();
        self.total += start.elapsed();
        value
    }

    /// Await `future`, adding its duration to the total.
    pub async fn measure_async<F: Future>(&mut self, future: F) -> F::Output {
        let start = Instant::now();
        let value = future.await;
        self.total += start.elapsed();
        value
    }

    /// Time accumulated so far.
    pub fn total(&self) -> Duration {
        self.total
    }

    pub fn total_ms(&self) -> u64 {
        self.total.as_millis() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn test_measure_accumulates() {
        let mut timer = ExecutionTimer::new();
        let value = timer.measure(|| {
            sleep(Duration::from_millis(10));
            42
        });
        timer.measure(|| sleep(Duration::from_millis(10)));

        assert_eq!(value, 42);
        assert!(timer.total_ms() >= 20);
    }

    #[tokio::test]
    async fn test_measure_async() {
        let mut timer = ExecutionTimer::new();
        let value = timer
            .measure_async(async {
                tokio::time::sleep(Duration::from_millis(10)).await;
                "done"
            })
            .await;

        assert_eq!(value, "done");
        assert!(timer.total() >= Duration::from_millis(10));
    }
}
