//! Collection runner

use std::sync::Arc;

use super::class::ClassRunner;
use super::{group_cases, run_level, RunContext};
use crate::di::ServiceProvider;
use crate::executor::{work_unit, ParallelExecutor, WorkUnit};
use crate::host::HostOptions;
use crate::models::{ExceptionAggregator, RunSummary, TestCase, TestCollection};
use crate::scope::ScopeLevel;

#[derive(Clone)]
pub struct CollectionRunner {
    context: RunContext,
}

impl CollectionRunner {
    pub fn new(context: RunContext) -> Self {
        Self { context }
    }

    /// Run the cases of `collection` inside a `Collection` scope opened under
    /// `parent`. Classes of one collection never run alongside each other.
    pub async fn run(
        &self,
        collection: Arc<TestCollection>,
        cases: Vec<Arc<dyn TestCase>>,
        parent: &ServiceProvider,
        aggregator: &ExceptionAggregator,
    ) -> RunSummary {
        let count = cases.len();
        run_level(
            &self.context,
            parent,
            ScopeLevel::Collection,
            &collection.name,
            count,
            aggregator,
            |services| self.run_classes(cases, services, aggregator),
        )
        .await
    }

    async fn run_classes(
        &self,
        cases: Vec<Arc<dyn TestCase>>,
        services: ServiceProvider,
        aggregator: &ExceptionAggregator,
    ) -> RunSummary {
        let runner = ClassRunner::new(self.context.clone());
        let units: Vec<WorkUnit> = group_cases(cases, |case| Arc::as_ptr(case.class()))
            .into_iter()
            .map(|group| {
                let class = group[0].class().clone();
                let runner = runner.clone();
                let services = services.clone();
                let aggregator = aggregator.child();
                work_unit(async move { runner.run(class, group, &services, &aggregator).await })
            })
            .collect();

        let options = HostOptions::current(&services);
        ParallelExecutor::run(
            units,
            options.allow_test_parallelization,
            true,
            &self.context.cancellation,
        )
        .await
    }
}
