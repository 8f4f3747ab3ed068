//! Framework executor
//!
//! Ties a run together: checks the runtime's capabilities, loads the host,
//! runs the hierarchy walk as the pipeline's terminal step and disposes the
//! host afterwards.

use parking_lot::Mutex;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::assembly::AssemblyRunner;
use super::runtime::{TestCaseOrderer, TestRuntime, CAPABILITY_VERSION};
use super::{RunContext, RuntimeError};
use crate::host::{delegate, HostLoader, Startup};
use crate::models::{ExecutionMessage, RunSummary, TestCase};

pub struct TestFrameworkExecutor {
    runtime: Arc<dyn TestRuntime>,
    startups: Vec<Arc<dyn Startup>>,
    cancellation: CancellationToken,
}

impl TestFrameworkExecutor {
    pub fn new(runtime: Arc<dyn TestRuntime>) -> Result<Self, RuntimeError> {
        let found = runtime.capability_version();
        if found != CAPABILITY_VERSION {
            return Err(RuntimeError::CapabilityMismatch {
                expected: CAPABILITY_VERSION,
                found,
            });
        }
        Ok(Self {
            runtime,
            startups: Vec::new(),
            cancellation: CancellationToken::new(),
        })
    }

    pub fn with_startup(mut self, startup: Arc<dyn Startup>) -> Self {
        self.startups.push(startup);
        self
    }

    /// The token shared by every level of the run. Cancelling it stops new
    /// work from being dispatched.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    /// Run `cases` end to end.
    ///
    /// Test failures are reported on the message bus and counted in the
    /// summary; only host configuration and pipeline errors are returned.
    pub async fn run(&self, cases: Vec<Arc<dyn TestCase>>) -> Result<RunSummary, RuntimeError> {
        let bus = self.runtime.message_bus();
        info!("Starting run of {} test cases", cases.len());

        let mut builder = HostLoader::default_builder(bus.clone());
        let orderer = self.runtime.orderer();
        builder.configure_services(move |services| {
            services.add_instance::<dyn TestCaseOrderer>(orderer);
        });

        let host = match HostLoader::create_host_with(builder, &self.startups) {
            Ok(host) => host,
            Err(err) => {
                error!("Cannot create test host: {}", err);
                bus.queue_message(ExecutionMessage::diagnostic(err.to_string()));
                return Err(err.into());
            }
        };

        let result = Arc::new(Mutex::new(RunSummary::default()));
        let terminal = {
            let result = result.clone();
            let bus = bus.clone();
            let cancellation = self.cancellation.clone();
            let cases = Arc::new(cases);
            delegate(move |host| {
                let runner =
                    AssemblyRunner::new(RunContext::new(host, bus.clone(), cancellation.clone()));
                let cases = cases.to_vec();
                let result = result.clone();
                async move {
                    let summary = runner.run(cases).await;
                    *result.lock() = summary;
                    Ok(())
                }
            })
        };

        let outcome = host.run_async(terminal).await;

        if let Err(err) = host.dispose() {
            warn!("Disposing the test host failed: {}", err);
            bus.queue_message(ExecutionMessage::diagnostic(format!(
                "Disposing the test host failed: {err}"
            )));
        }

        if let Err(err) = outcome {
            error!("Run pipeline failed: {:#}", err);
            bus.queue_message(ExecutionMessage::diagnostic(format!("{err:#}")));
            return Err(RuntimeError::Pipeline(err));
        }

        let summary = *result.lock();
        info!("{}", summary);
        Ok(summary)
    }
}
