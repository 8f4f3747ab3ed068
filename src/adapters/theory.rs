//! Parameterized cases
//!
//! Runs one execution per data row, each in its own `Case` scope.

use futures::future::{BoxFuture, FutureExt};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, warn};

use super::{report_failure, AdapterContext, TestCaseAdapter};
use crate::executor::{work_unit, ParallelExecutor, WorkUnit};
use crate::host::HostOptions;
use crate::models::{ExecutionMessage, Invocation, RunSummary, TestCase};
use crate::scope::{LifetimeScope, ScopeLevel};

/// Claims every case with a data source.
#[derive(Clone, Copy, Debug, Default)]
pub struct TheoryTestCaseAdapter;

impl TestCaseAdapter for TheoryTestCaseAdapter {
    fn can_handle(&self, case: &dyn TestCase) -> bool {
        case.data_source().is_some()
    }

    fn run(
        &self,
        case: Arc<dyn TestCase>,
        context: AdapterContext,
    ) -> BoxFuture<'static, RunSummary> {
        run_rows(case, context).boxed()
    }

    fn name(&self) -> &str {
        "theory"
    }
}

async fn run_rows(case: Arc<dyn TestCase>, context: AdapterContext) -> RunSummary {
    let rows = match case.data_source().map(|source| source.rows()) {
        Some(Ok(rows)) => rows,
        Some(Err(err)) => {
            error!("Data source for {} failed: {:#}", case.display_name(), err);
            return report_failure(
                context.bus.as_ref(),
                case.display_name(),
                format!("Failed to enumerate data rows: {err:#}"),
                &context.cancellation,
            );
        }
        None => Vec::new(),
    };
    debug!("{} has {} data rows", case.display_name(), rows.len());

    let mut scopes: Vec<(String, LifetimeScope)> = Vec::with_capacity(rows.len());
    let mut units: Vec<WorkUnit> = Vec::with_capacity(rows.len());

    for row in rows {
        let name = format!("{}({})", case.display_name(), row.label);
        let scope = match LifetimeScope::open(&context.services, ScopeLevel::Case) {
            Ok(scope) => scope,
            Err(err) => {
                let summary = report_failure(
                    context.bus.as_ref(),
                    &name,
                    err.to_string(),
                    &context.cancellation,
                );
                units.push(work_unit(async move { summary }));
                continue;
            }
        };

        let aggregator = context.aggregator.child();
        let constructor_arguments = context
            .constructor_arguments
            .resolve(scope.services(), &aggregator);
        let invocation = Invocation {
            display_name: name.clone(),
            constructor_arguments,
            method_arguments: row.arguments,
            skip_reason: case.skip_reason().map(str::to_string).or(row.skip_reason),
            services: scope.services().clone(),
            bus: context.bus.clone(),
            aggregator,
            cancellation: context.cancellation.clone(),
        };

        let case = case.clone();
        units.push(work_unit(async move { case.run(invocation).await }));
        scopes.push((name, scope));
    }

    let options = HostOptions::current(&context.services);
    let constrained = !case.class().is_parallelizable();
    let mut summary = ParallelExecutor::run(
        units,
        options.allow_test_parallelization,
        constrained,
        &context.cancellation,
    )
    .await;

    // Row scopes close one after another once the whole batch is done.
    let started = Instant::now();
    for (name, scope) in scopes {
        if let Err(err) = scope.close() {
            warn!("Cleanup of {} failed: {}", name, err);
            context.bus.queue_message(ExecutionMessage::CleanupFailure {
                level: ScopeLevel::Case,
                name,
                message: err.to_string(),
            });
            context.aggregator.add(err);
        }
    }
    summary.time += started.elapsed();
    summary
}
