//! Method runner
//!
//! Runs the cases of one test method, dispatching each to an adapter or the
//! default path.

use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error};

use super::{close_scope, run_level, RunContext};
use crate::adapters::{report_failure, AdapterContext, Dispatch};
use crate::arguments::DeferredConstructorArguments;
use crate::di::ServiceProvider;
use crate::executor::{work_unit, ParallelExecutor, WorkUnit};
use crate::host::HostOptions;
use crate::models::{ExceptionAggregator, Invocation, RunSummary, TestCase, TestMethod};
use crate::scope::{LifetimeScope, ScopeLevel};
use crate::utils::panic_message;

#[derive(Clone)]
pub struct MethodRunner {
    context: RunContext,
}

impl MethodRunner {
    pub fn new(context: RunContext) -> Self {
        Self { context }
    }

    /// Run `cases`, all belonging to `method`, inside a `Method` scope opened
    /// under `parent`.
    pub async fn run(
        &self,
        method: Arc<TestMethod>,
        cases: Vec<Arc<dyn TestCase>>,
        parent: &ServiceProvider,
        arguments: DeferredConstructorArguments,
        aggregator: &ExceptionAggregator,
    ) -> RunSummary {
        let name = method.full_name();
        let count = cases.len();
        run_level(
            &self.context,
            parent,
            ScopeLevel::Method,
            &name,
            count,
            aggregator,
            |services| self.run_cases(method, cases, services, arguments, aggregator),
        )
        .await
    }

    async fn run_cases(
        &self,
        method: Arc<TestMethod>,
        cases: Vec<Arc<dyn TestCase>>,
        services: ServiceProvider,
        arguments: DeferredConstructorArguments,
        aggregator: &ExceptionAggregator,
    ) -> RunSummary {
        let units: Vec<WorkUnit> = cases
            .into_iter()
            .map(|case| {
                let runner = self.clone();
                let services = services.clone();
                let arguments = arguments.clone();
                let aggregator = aggregator.child();
                work_unit(async move {
                    runner.run_case(case, services, arguments, aggregator).await
                })
            })
            .collect();

        let options = HostOptions::current(&services);
        ParallelExecutor::run(
            units,
            options.allow_test_parallelization,
            !method.class.is_parallelizable(),
            &self.context.cancellation,
        )
        .await
    }

    /// Run one case through the adapter that claims it, or the default path.
    pub async fn run_case(
        &self,
        case: Arc<dyn TestCase>,
        services: ServiceProvider,
        arguments: DeferredConstructorArguments,
        aggregator: ExceptionAggregator,
    ) -> RunSummary {
        match self.context.host.adapters().dispatch(&*case) {
            Dispatch::Adapter(adapter) => {
                let context = AdapterContext {
                    services,
                    bus: self.context.bus.clone(),
                    constructor_arguments: arguments,
                    aggregator,
                    cancellation: self.context.cancellation.clone(),
                };
                adapter.run(case, context).await
            }
            Dispatch::Default => self.run_default(case, services, arguments, aggregator).await,
        }
    }

    /// Open a `Case` scope, resolve the constructor arguments against it, run
    /// the case and close the scope whatever happened.
    async fn run_default(
        &self,
        case: Arc<dyn TestCase>,
        services: ServiceProvider,
        arguments: DeferredConstructorArguments,
        aggregator: ExceptionAggregator,
    ) -> RunSummary {
        let name = case.display_name().to_string();
        let scope = match LifetimeScope::open(&services, ScopeLevel::Case) {
            Ok(scope) => scope,
            Err(err) => {
                error!("Cannot open case scope for {}: {}", name, err);
                return report_failure(
                    self.context.bus.as_ref(),
                    &name,
                    err.to_string(),
                    &self.context.cancellation,
                );
            }
        };

        let invocation = Invocation {
            display_name: name.clone(),
            constructor_arguments: arguments.resolve(scope.services(), &aggregator),
            method_arguments: Vec::new(),
            skip_reason: case.skip_reason().map(str::to_string),
            services: scope.services().clone(),
            bus: self.context.bus.clone(),
            aggregator: aggregator.clone(),
            cancellation: self.context.cancellation.clone(),
        };

        let mut summary = match AssertUnwindSafe(case.run(invocation)).catch_unwind().await {
            Ok(summary) => summary,
            Err(panic) => report_failure(
                self.context.bus.as_ref(),
                &name,
                format!("Test panicked: {}", panic_message(&*panic)),
                &self.context.cancellation,
            ),
        };

        let started = Instant::now();
        close_scope(&self.context, &scope, &name, &aggregator);
        summary.time += started.elapsed();
        debug!("{} finished: {}", name, summary);
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::TestCaseAdapter;
    use crate::arguments::ParameterInfo;
    use crate::di::{Dispose, Lifetime};
    use crate::host::{Host, HostBuilder};
    use crate::models::{DelegateTestCase, ExecutionMessage, MessageLog, TestClass, TestCollection};
    use anyhow::anyhow;
    use futures::future::BoxFuture;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    struct Socket;

    impl Dispose for Socket {
        fn dispose(&self) -> anyhow::Result<()> {
            Err(anyhow!("socket still bound"))
        }
    }

    struct Database;

    struct Claiming {
        runs: Arc<AtomicUsize>,
    }

    impl TestCaseAdapter for Claiming {
        fn can_handle(&self, case: &dyn TestCase) -> bool {
            case.method().name == "claimed"
        }

        fn run(
            &self,
            _case: Arc<dyn TestCase>,
            _context: AdapterContext,
        ) -> BoxFuture<'static, RunSummary> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            async { RunSummary::passed(Duration::ZERO) }.boxed()
        }
    }

    fn runner(configure: impl FnOnce(&mut HostBuilder)) -> (MethodRunner, Arc<MessageLog>) {
        let log = Arc::new(MessageLog::new());
        let mut builder = Host::builder();
        builder.without_environment();
        configure(&mut builder);
        let host = Arc::new(builder.build().unwrap());
        let context = RunContext::new(host, log.clone(), CancellationToken::new());
        (MethodRunner::new(context), log)
    }

    fn class() -> Arc<TestClass> {
        TestClass::new("SocketTests", TestCollection::new("c"))
            .with_constructor(vec![ParameterInfo::required::<Database>("db")])
            .into_shared()
    }

    #[tokio::test]
    async fn test_default_path_closes_case_scope_and_reports_cleanup() {
        let (runner, log) = runner(|builder| {
            builder.configure_services(|services| {
                services.add_disposable::<Socket, _>(Lifetime::Named(ScopeLevel::Case), |_| {
                    Ok(Arc::new(Socket))
                });
            });
        });
        let method = TestMethod::new(class(), "binds");
        let case = DelegateTestCase::new(method.clone(), |ctx| async move {
            ctx.services.resolve::<Socket>()?;
            Ok(())
        })
        .into_shared();

        let root = runner.context.host.services().clone();
        let aggregator = ExceptionAggregator::new();
        let arguments = DeferredConstructorArguments::empty("SocketTests");
        let summary = runner
            .run(method, vec![case], &root, arguments, &aggregator)
            .await;

        assert_eq!((summary.total, summary.failed), (1, 0));
        let cleanup = log.cleanup_failures();
        assert_eq!(cleanup.len(), 1);
        assert!(matches!(
            &cleanup[0],
            ExecutionMessage::CleanupFailure { level: ScopeLevel::Case, name, .. }
                if name == "SocketTests.binds"
        ));
    }

    #[tokio::test]
    async fn test_missing_constructor_argument_fails_case() {
        let (runner, log) = runner(|_| {});
        let class = class();
        let method = TestMethod::new(class.clone(), "queries");
        let ran = Arc::new(AtomicUsize::new(0));
        let counter = ran.clone();
        let case = DelegateTestCase::new(method.clone(), move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Ok(()) }
        })
        .into_shared();

        let arguments = DeferredConstructorArguments::build(
            "SocketTests",
            class.constructor.clone().unwrap_or_default(),
            |_| None,
        );
        let root = runner.context.host.services().clone();
        let summary = runner
            .run(method, vec![case], &root, arguments, &ExceptionAggregator::new())
            .await;

        assert_eq!((summary.total, summary.failed), (1, 1));
        assert_eq!(ran.load(Ordering::SeqCst), 0);
        assert!(log.failures()[0].to_string().contains("db"));
    }

    #[tokio::test]
    async fn test_claimed_case_goes_to_adapter() {
        let runs = Arc::new(AtomicUsize::new(0));
        let adapter = Claiming { runs: runs.clone() };
        let (runner, log) = runner(move |builder| {
            builder.add_adapter(Arc::new(adapter));
        });
        let class = TestClass::new("Adapted", TestCollection::new("c")).into_shared();
        let claimed = TestMethod::new(class.clone(), "claimed");
        let case = DelegateTestCase::new(claimed.clone(), |_| async { Ok(()) }).into_shared();

        let root = runner.context.host.services().clone();
        let summary = runner
            .run(
                claimed,
                vec![case],
                &root,
                DeferredConstructorArguments::empty("Adapted"),
                &ExceptionAggregator::new(),
            )
            .await;

        assert_eq!(summary.total, 1);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        // The adapter owns reporting; the stub reports nothing.
        assert!(log.passed().is_empty());
    }
}
