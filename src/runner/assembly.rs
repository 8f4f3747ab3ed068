//! Assembly runner
//!
//! Entry point of the hierarchy walk: splits the discovered cases into
//! collections and runs those as one batch against the host's root services.

use std::sync::Arc;
use tracing::info;

use super::collection::CollectionRunner;
use super::{group_cases, RunContext};
use crate::executor::{work_unit, ParallelExecutor, WorkUnit};
use crate::models::{ExceptionAggregator, RunSummary, TestCase};
use crate::utils::ExecutionTimer;

#[derive(Clone)]
pub struct AssemblyRunner {
    context: RunContext,
    aggregator: ExceptionAggregator,
}

impl AssemblyRunner {
    pub fn new(context: RunContext) -> Self {
        Self {
            context,
            aggregator: ExceptionAggregator::new(),
        }
    }

    /// Errors collected at assembly level, cleanup failures included.
    pub fn aggregator(&self) -> &ExceptionAggregator {
        &self.aggregator
    }

    pub async fn run(&self, cases: Vec<Arc<dyn TestCase>>) -> RunSummary {
        let groups = group_cases(cases, |case| case.collection().name.clone());
        let allow_parallel = self.context.host.options().allow_test_parallelization;
        info!(
            "Running {} collections (parallelization {})",
            groups.len(),
            if allow_parallel { "on" } else { "off" }
        );

        let root = self.context.host.services().clone();
        let runner = CollectionRunner::new(self.context.clone());
        let units: Vec<WorkUnit> = groups
            .into_iter()
            .map(|group| {
                let collection = group[0].collection().clone();
                let runner = runner.clone();
                let root = root.clone();
                let aggregator = ExceptionAggregator::new();
                let parent = self.aggregator.clone();
                work_unit(async move {
                    let summary = runner.run(collection, group, &root, &aggregator).await;
                    parent.aggregate(&aggregator);
                    summary
                })
            })
            .collect();

        let mut timer = ExecutionTimer::new();
        let summary = timer
            .measure_async(ParallelExecutor::run(
                units,
                allow_parallel,
                false,
                &self.context.cancellation,
            ))
            .await;

        info!("Run complete in {}ms: {}", timer.total_ms(), summary);
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{Host, ALLOW_PARALLELIZATION_KEY};
    use crate::models::{DelegateTestCase, MessageLog, TestClass, TestCollection, TestMethod};
    use parking_lot::Mutex;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    fn runner(parallel: bool) -> (AssemblyRunner, Arc<MessageLog>) {
        let mut builder = Host::builder();
        builder
            .without_environment()
            .configuration()
            .add_in_memory([(ALLOW_PARALLELIZATION_KEY, if parallel { "true" } else { "false" })]);
        let host = Arc::new(builder.build().unwrap());
        let log = Arc::new(MessageLog::new());
        let context = RunContext::new(host, log.clone(), CancellationToken::new());
        (AssemblyRunner::new(context), log)
    }

    /// One case per collection, each sleeping `ms` and recording its name.
    fn cases(
        names: &[&'static str],
        ms: u64,
        seen: &Arc<Mutex<Vec<String>>>,
    ) -> Vec<Arc<dyn TestCase>> {
        names
            .iter()
            .map(|&name| {
                let class = TestClass::new("Sleepy", TestCollection::new(name)).into_shared();
                let seen = seen.clone();
                DelegateTestCase::new(TestMethod::new(class, name), move |_| {
                    let seen = seen.clone();
                    async move {
                        tokio::time::sleep(Duration::from_millis(ms)).await;
                        seen.lock().push(name.to_string());
                        Ok(())
                    }
                })
                .into_shared()
            })
            .collect()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_collections_overlap_when_parallel() {
        let (runner, log) = runner(true);
        let seen = Arc::new(Mutex::new(Vec::new()));

        let summary = runner.run(cases(&["a", "b", "c"], 60, &seen)).await;

        assert_eq!((summary.total, summary.failed), (3, 0));
        assert_eq!(log.passed().len(), 3);
        assert!(summary.time < Duration::from_millis(150));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_parallelization_off_runs_in_order() {
        let (runner, _log) = runner(false);
        let seen = Arc::new(Mutex::new(Vec::new()));

        let summary = runner.run(cases(&["a", "b", "c"], 20, &seen)).await;

        assert_eq!(summary.total, 3);
        assert_eq!(*seen.lock(), vec!["a", "b", "c"]);
        assert!(summary.time >= Duration::from_millis(60));
    }
}
