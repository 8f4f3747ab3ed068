//! Test case adapters
//!
//! Alternate execution strategies that intercept a case before the default
//! path runs it. The most recently registered adapter claiming a case wins.

use futures::future::BoxFuture;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::arguments::DeferredConstructorArguments;
use crate::di::{ResolveError, ServiceProvider};
use crate::models::{ExceptionAggregator, ExecutionMessage, MessageBus, RunSummary, TestCase};

mod theory;

pub use theory::TheoryTestCaseAdapter;

/// What an adapter receives alongside the case.
#[derive(Clone)]
pub struct AdapterContext {
    /// The method-level scope the case belongs to.
    pub services: ServiceProvider,
    pub bus: Arc<dyn MessageBus>,
    pub constructor_arguments: DeferredConstructorArguments,
    pub aggregator: ExceptionAggregator,
    pub cancellation: CancellationToken,
}

/// An execution strategy for some kinds of cases.
///
/// An adapter that claims a case owns its reporting: it emits the result
/// messages itself and returns the summary for what it ran.
pub trait TestCaseAdapter: Send + Sync + 'static {
    fn can_handle(&self, case: &dyn TestCase) -> bool;

    fn run(
        &self,
        case: Arc<dyn TestCase>,
        context: AdapterContext,
    ) -> BoxFuture<'static, RunSummary>;

    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Outcome of an adapter lookup.
pub enum Dispatch {
    Adapter(Arc<dyn TestCaseAdapter>),
    Default,
}

/// Registered adapters, in registration order.
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: Vec<Arc<dyn TestCaseAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `dyn TestCaseAdapter` registered in `services`.
    pub fn from_services(services: &ServiceProvider) -> Result<Self, ResolveError> {
        Ok(Self {
            adapters: services.get_all::<dyn TestCaseAdapter>()?,
        })
    }

    pub fn register(&mut self, adapter: Arc<dyn TestCaseAdapter>) -> &mut Self {
        self.adapters.push(adapter);
        self
    }

    /// The last registered adapter claiming `case`, or the default path.
    pub fn dispatch(&self, case: &dyn TestCase) -> Dispatch {
        match self.adapters.iter().rev().find(|a| a.can_handle(case)) {
            Some(adapter) => {
                debug!("{} handled by {}", case.display_name(), adapter.name());
                Dispatch::Adapter(adapter.clone())
            }
            None => Dispatch::Default,
        }
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

impl fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.adapters.iter().map(|a| a.name().to_string()))
            .finish()
    }
}

/// Report `test` as a single failure that never ran. A refused message
/// cancels the run.
pub(crate) fn report_failure(
    bus: &dyn MessageBus,
    test: &str,
    message: String,
    cancellation: &CancellationToken,
) -> RunSummary {
    let accepted = [
        ExecutionMessage::TestStarting {
            test: test.to_string(),
        },
        ExecutionMessage::TestFailed {
            test: test.to_string(),
            time: Duration::ZERO,
            message,
        },
        ExecutionMessage::TestFinished {
            test: test.to_string(),
            time: Duration::ZERO,
        },
    ]
    .into_iter()
    .all(|m| bus.queue_message(m));

    if !accepted {
        cancellation.cancel();
    }
    RunSummary::failed(Duration::ZERO)
}
