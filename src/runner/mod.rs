//! Hierarchy walker
//!
//! Assembly, collection, class and method runners. Each level opens its own
//! scope, computes the batch of children, hands it to the parallel executor
//! and closes the scope again on every path.

use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::di::ServiceProvider;
use crate::host::{Host, HostError};
use crate::models::{ExceptionAggregator, ExecutionMessage, MessageBus, RunSummary, TestCase};
use crate::scope::{LifetimeScope, ScopeLevel};
use crate::utils::panic_message;

mod assembly;
mod class;
mod collection;
mod framework;
mod method;
mod runtime;

pub use assembly::AssemblyRunner;
pub use class::ClassRunner;
pub use collection::CollectionRunner;
pub use framework::TestFrameworkExecutor;
pub use method::MethodRunner;
pub use runtime::{
    InProcessRuntime, NaturalOrderer, TestCaseOrderer, TestRuntime, UniqueIdOrderer,
    CAPABILITY_VERSION,
};

#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("Unsupported runtime capability version {found} (expected {expected})")]
    CapabilityMismatch { expected: u32, found: u32 },

    #[error(transparent)]
    Host(#[from] HostError),

    #[error("Run pipeline failed: {0:#}")]
    Pipeline(anyhow::Error),
}

/// What every runner shares for one run.
#[derive(Clone)]
pub struct RunContext {
    pub host: Arc<Host>,
    pub bus: Arc<dyn MessageBus>,
    pub cancellation: CancellationToken,
}

impl RunContext {
    pub fn new(host: Arc<Host>, bus: Arc<dyn MessageBus>, cancellation: CancellationToken) -> Self {
        Self {
            host,
            bus,
            cancellation,
        }
    }

    /// Queue `message`, cancelling the run if the bus refuses it.
    pub(crate) fn report(&self, message: ExecutionMessage) {
        if !self.bus.queue_message(message) {
            self.cancellation.cancel();
        }
    }
}

/// Run one level: open its scope under `parent`, run `body` against it, then
/// close the scope. Never fails; an unopenable scope or a panicking body
/// counts every one of the level's `count` cases as failed.
pub(crate) async fn run_level<F, Fut>(
    context: &RunContext,
    parent: &ServiceProvider,
    level: ScopeLevel,
    name: &str,
    count: usize,
    aggregator: &ExceptionAggregator,
    body: F,
) -> RunSummary
where
    F: FnOnce(ServiceProvider) -> Fut,
    Fut: Future<Output = RunSummary>,
{
    info!("Starting {} {} ({} cases)", level, name, count);

    let scope = match LifetimeScope::open(parent, level) {
        Ok(scope) => scope,
        Err(err) => {
            error!("Cannot open {} scope for {}: {}", level, name, err);
            context.report(ExecutionMessage::diagnostic(format!(
                "{level} {name} did not run: {err}"
            )));
            return RunSummary::all_failed(count);
        }
    };

    let summary = match AssertUnwindSafe(body(scope.services().clone()))
        .catch_unwind()
        .await
    {
        Ok(summary) => summary,
        Err(panic) => {
            let message = panic_message(&*panic);
            error!("{} {} panicked: {}", level, name, message);
            context.report(ExecutionMessage::diagnostic(format!(
                "{level} {name} aborted: {message}"
            )));
            RunSummary::all_failed(count)
        }
    };

    close_scope(context, &scope, name, aggregator);
    info!("Finished {} {}: {}", level, name, summary);
    summary
}

/// Close `scope`, reporting a disposal failure as a cleanup failure of its
/// level and recording it in `aggregator`.
pub(crate) fn close_scope(
    context: &RunContext,
    scope: &LifetimeScope,
    name: &str,
    aggregator: &ExceptionAggregator,
) {
    if let Err(err) = scope.close() {
        warn!("Cleanup of {} {} failed: {}", scope.level(), name, err);
        context.report(ExecutionMessage::CleanupFailure {
            level: scope.level(),
            name: name.to_string(),
            message: err.to_string(),
        });
        aggregator.add(err);
    }
}

/// Split `cases` into groups sharing a key, in first-seen order.
pub(crate) fn group_cases<K, F>(
    cases: Vec<Arc<dyn TestCase>>,
    key: F,
) -> Vec<Vec<Arc<dyn TestCase>>>
where
    K: PartialEq,
    F: Fn(&dyn TestCase) -> K,
{
    let mut keys: Vec<K> = Vec::new();
    let mut groups: Vec<Vec<Arc<dyn TestCase>>> = Vec::new();
    for case in cases {
        let k = key(&*case);
        match keys.iter().position(|existing| *existing == k) {
            Some(index) => groups[index].push(case),
            None => {
                keys.push(k);
                groups.push(vec![case]);
            }
        }
    }
    groups
}
