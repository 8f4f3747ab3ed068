//! Closure-backed work unit

use anyhow::anyhow;
use futures::future::{BoxFuture, FutureExt};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::message::ExecutionMessage;
use super::output::TestOutput;
use super::summary::RunSummary;
use super::test_case::{DataSource, Invocation, TestCase, TestMethod};
use crate::arguments::ConstructorArguments;
use crate::di::{downcast_instance, Instance, ServiceProvider};
use crate::utils::{panic_message, ExecutionTimer};

/// What a test body gets to work with.
pub struct TestContext {
    pub display_name: String,
    pub constructor_arguments: ConstructorArguments,
    pub method_arguments: Vec<Instance>,
    pub services: ServiceProvider,
    pub cancellation: CancellationToken,
}

impl TestContext {
    /// Method argument `index` as a `T`.
    pub fn argument<T: ?Sized + Send + Sync + 'static>(&self, index: usize) -> Option<Arc<T>> {
        self.method_arguments.get(index).and_then(downcast_instance::<T>)
    }

    /// The case's output buffer, when one is registered.
    pub fn output(&self) -> Option<Arc<TestOutput>> {
        self.services.get::<TestOutput>().ok().flatten()
    }
}

type Body = Arc<dyn Fn(TestContext) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// A work unit whose body is an async closure.
///
/// Reports its own start, result and finish messages. A cancelled run
/// returns an empty summary without touching the body, and errors already
/// in the aggregator fail the case before the body runs.
pub struct DelegateTestCase {
    unique_id: String,
    display_name: String,
    method: Arc<TestMethod>,
    skip_reason: Option<String>,
    data: Option<Arc<dyn DataSource>>,
    body: Body,
}

impl DelegateTestCase {
    pub fn new<F, Fut>(method: Arc<TestMethod>, body: F) -> Self
    where
        F: Fn(TestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let name = method.full_name();
        Self {
            unique_id: name.clone(),
            display_name: name,
            method,
            skip_reason: None,
            data: None,
            body: Arc::new(
                move |context: TestContext| -> BoxFuture<'static, anyhow::Result<()>> {
                    body(context).boxed()
                },
            ),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.unique_id = id.into();
        self
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = name.into();
        self
    }

    pub fn skip(mut self, reason: impl Into<String>) -> Self {
        self.skip_reason = Some(reason.into());
        self
    }

    /// Make this a parameterized case fed by `source`.
    pub fn with_data(mut self, source: impl DataSource + 'static) -> Self {
        self.data = Some(Arc::new(source));
        self
    }

    pub fn into_shared(self) -> Arc<dyn TestCase> {
        Arc::new(self)
    }

    async fn execute(&self, invocation: Invocation) -> RunSummary {
        let Invocation {
            display_name,
            constructor_arguments,
            method_arguments,
            skip_reason,
            services,
            bus,
            aggregator,
            cancellation,
        } = invocation;

        if cancellation.is_cancelled() {
            debug!("{} not started: run cancelled", display_name);
            return RunSummary::default();
        }

        let report = |message: ExecutionMessage| {
            if !bus.queue_message(message) {
                cancellation.cancel();
            }
        };

        report(ExecutionMessage::TestStarting {
            test: display_name.clone(),
        });

        if let Some(reason) = skip_reason {
            report(ExecutionMessage::TestSkipped {
                test: display_name.clone(),
                reason,
            });
            report(ExecutionMessage::TestFinished {
                test: display_name,
                time: Default::default(),
            });
            return RunSummary::skipped();
        }

        let mut timer = ExecutionTimer::new();
        if !aggregator.has_errors() {
            let context = TestContext {
                display_name: display_name.clone(),
                constructor_arguments,
                method_arguments,
                services,
                cancellation: cancellation.clone(),
            };
            let body = AssertUnwindSafe((self.body)(context)).catch_unwind();
            match timer.measure_async(body).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => aggregator.add(err),
                Err(panic) => aggregator.add(anyhow!("Test panicked: {}", panic_message(&*panic))),
            }
        }

        let time = timer.total();
        let summary = match aggregator.to_error() {
            Some(err) => {
                report(ExecutionMessage::TestFailed {
                    test: display_name.clone(),
                    time,
                    message: err.to_string(),
                });
                RunSummary::failed(time)
            }
            None => {
                report(ExecutionMessage::TestPassed {
                    test: display_name.clone(),
                    time,
                });
                RunSummary::passed(time)
            }
        };

        report(ExecutionMessage::TestFinished {
            test: display_name,
            time,
        });
        summary
    }
}

impl TestCase for DelegateTestCase {
    fn unique_id(&self) -> &str {
        &self.unique_id
    }

    fn display_name(&self) -> &str {
        &self.display_name
    }

    fn skip_reason(&self) -> Option<&str> {
        self.skip_reason.as_deref()
    }

    fn method(&self) -> &Arc<TestMethod> {
        &self.method
    }

    fn data_source(&self) -> Option<&dyn DataSource> {
        self.data.as_deref()
    }

    fn run(&self, invocation: Invocation) -> BoxFuture<'_, RunSummary> {
        self.execute(invocation).boxed()
    }
}
