//! Parallel execution
//!
//! Runs a batch of independent work units either concurrently or strictly
//! in order, and merges their summaries accordingly.

use futures::future::{join_all, BoxFuture, FutureExt};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::models::RunSummary;
use crate::utils::panic_message;

/// A zero-argument asynchronous task producing a summary.
pub type WorkUnit = Box<dyn FnOnce() -> BoxFuture<'static, RunSummary> + Send>;

/// Wrap a future as a [`WorkUnit`].
pub fn work_unit<Fut>(future: Fut) -> WorkUnit
where
    Fut: Future<Output = RunSummary> + Send + 'static,
{
    Box::new(move || future.boxed())
}

/// Batch executor
pub struct ParallelExecutor;

impl ParallelExecutor {
    /// Run `units`, concurrently when there is more than one, parallel
    /// execution is allowed and the batch is not `constrained` (shared
    /// fixtures or explicit grouping).
    ///
    /// Cancellation is checked before each unit is dispatched; units already
    /// running are left to observe it themselves.
    pub async fn run(
        units: Vec<WorkUnit>,
        allow_parallel: bool,
        constrained: bool,
        cancellation: &CancellationToken,
    ) -> RunSummary {
        if units.len() > 1 && allow_parallel && !constrained {
            debug!("Running {} units concurrently", units.len());
            Self::run_concurrent(units, cancellation).await
        } else {
            debug!("Running {} units sequentially", units.len());
            Self::run_sequential(units, cancellation).await
        }
    }

    async fn run_sequential(units: Vec<WorkUnit>, cancellation: &CancellationToken) -> RunSummary {
        let mut summary = RunSummary::default();
        for (index, unit) in units.into_iter().enumerate() {
            if cancellation.is_cancelled() {
                debug!("Cancelled before unit {}", index + 1);
                break;
            }
            summary.aggregate(guarded(unit).await);
        }
        summary
    }

    async fn run_concurrent(units: Vec<WorkUnit>, cancellation: &CancellationToken) -> RunSummary {
        let handle = Handle::current();
        // A current-thread scheduler would interleave every sibling on the
        // caller's thread; hand each one to the blocking pool instead.
        let single_threaded = handle.runtime_flavor() == RuntimeFlavor::CurrentThread;

        let mut tasks: Vec<JoinHandle<RunSummary>> = Vec::with_capacity(units.len());
        for (index, unit) in units.into_iter().enumerate() {
            if cancellation.is_cancelled() {
                debug!("Cancelled before dispatching unit {}", index + 1);
                break;
            }
            let task = guarded(unit);
            if single_threaded {
                let handle = handle.clone();
                tasks.push(tokio::task::spawn_blocking(move || handle.block_on(task)));
            } else {
                tasks.push(tokio::spawn(task));
            }
        }

        let mut summary = RunSummary::default();
        for result in join_all(tasks).await {
            match result {
                Ok(unit_summary) => summary.aggregate_concurrent(unit_summary),
                Err(err) => {
                    error!("Work unit did not complete: {}", err);
                    summary.aggregate_concurrent(RunSummary::failed(Duration::ZERO));
                }
            }
        }
        summary
    }
}

/// Run a unit, turning a panic into a single failure.
async fn guarded(unit: WorkUnit) -> RunSummary {
    match AssertUnwindSafe(async move { unit().await })
        .catch_unwind()
        .await
    {
        Ok(summary) => summary,
        Err(panic) => {
            error!("Work unit panicked: {}", panic_message(&*panic));
            RunSummary::failed(Duration::ZERO)
        }
    }
}
