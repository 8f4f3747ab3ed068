//! Class runner

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::method::MethodRunner;
use super::runtime::TestCaseOrderer;
use super::{group_cases, run_level, RunContext};
use crate::arguments::{DeferredConstructorArguments, ParameterInfo};
use crate::di::{instance_of, Instance, ServiceProvider};
use crate::executor::{work_unit, ParallelExecutor, WorkUnit};
use crate::host::HostOptions;
use crate::models::{ExceptionAggregator, ExecutionMessage, RunSummary, TestCase, TestClass};
use crate::scope::ScopeLevel;
use crate::utils::panic_message;

#[derive(Clone)]
pub struct ClassRunner {
    context: RunContext,
}

impl ClassRunner {
    pub fn new(context: RunContext) -> Self {
        Self { context }
    }

    /// Run the cases of `class` inside a `Class` scope opened under `parent`.
    ///
    /// Cases are ordered by the registered [`TestCaseOrderer`], grouped by
    /// method, and the method groups run as one batch.
    pub async fn run(
        &self,
        class: Arc<TestClass>,
        cases: Vec<Arc<dyn TestCase>>,
        parent: &ServiceProvider,
        aggregator: &ExceptionAggregator,
    ) -> RunSummary {
        let name = class.name.clone();
        let count = cases.len();
        run_level(
            &self.context,
            parent,
            ScopeLevel::Class,
            &name,
            count,
            aggregator,
            |services| self.run_methods(class, cases, services, aggregator),
        )
        .await
    }

    async fn run_methods(
        &self,
        class: Arc<TestClass>,
        cases: Vec<Arc<dyn TestCase>>,
        services: ServiceProvider,
        aggregator: &ExceptionAggregator,
    ) -> RunSummary {
        let cases = self.order(&class, &services, cases);
        let arguments = constructor_arguments(&class, &self.context.cancellation);

        let runner = MethodRunner::new(self.context.clone());
        let units: Vec<WorkUnit> = group_cases(cases, |case| Arc::as_ptr(case.method()))
            .into_iter()
            .map(|group| {
                let method = group[0].method().clone();
                let runner = runner.clone();
                let services = services.clone();
                let arguments = arguments.clone();
                let aggregator = aggregator.child();
                work_unit(async move {
                    runner
                        .run(method, group, &services, arguments, &aggregator)
                        .await
                })
            })
            .collect();

        let options = HostOptions::current(&services);
        ParallelExecutor::run(
            units,
            options.allow_test_parallelization,
            !class.is_parallelizable(),
            &self.context.cancellation,
        )
        .await
    }

    /// Apply the registered orderer, keeping the natural order when there is
    /// none or it fails.
    fn order(
        &self,
        class: &TestClass,
        services: &ServiceProvider,
        cases: Vec<Arc<dyn TestCase>>,
    ) -> Vec<Arc<dyn TestCase>> {
        let orderer = match services.get::<dyn TestCaseOrderer>() {
            Ok(Some(orderer)) => orderer,
            Ok(None) => return cases,
            Err(err) => {
                self.fall_back(class, &err.to_string());
                return cases;
            }
        };

        let natural = cases.clone();
        match std::panic::catch_unwind(AssertUnwindSafe(|| orderer.order(cases))) {
            Ok(Ok(ordered)) => ordered,
            Ok(Err(err)) => {
                self.fall_back(class, &format!("{err:#}"));
                natural
            }
            Err(panic) => {
                self.fall_back(class, &panic_message(&*panic));
                natural
            }
        }
    }

    fn fall_back(&self, class: &TestClass, reason: &str) {
        warn!("Ordering {} failed, using discovery order: {}", class.name, reason);
        self.context.report(ExecutionMessage::diagnostic(format!(
            "Test case orderer failed for {}: {}",
            class.name, reason
        )));
    }
}

/// The class's deferred constructor arguments. The run's cancellation token
/// and the class's fixtures are supplied up front.
fn constructor_arguments(
    class: &TestClass,
    cancellation: &CancellationToken,
) -> DeferredConstructorArguments {
    let Some(parameters) = &class.constructor else {
        return DeferredConstructorArguments::empty(class.name.clone());
    };

    debug!("{} takes {} constructor parameters", class.name, parameters.len());
    DeferredConstructorArguments::build(
        class.name.clone(),
        parameters.clone(),
        |parameter: &ParameterInfo| -> Option<Instance> {
            if parameter.is::<CancellationToken>() {
                Some(instance_of(Arc::new(cancellation.clone())))
            } else {
                class.fixture(parameter.service()).cloned()
            }
        },
    )
}
