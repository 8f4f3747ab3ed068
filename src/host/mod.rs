//! Test host
//!
//! The process-wide host for a run: configuration, root services, options,
//! adapters and the middleware pipeline wrapped around the hierarchy walk.

use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

use crate::adapters::AdapterRegistry;
use crate::config::Configuration;
use crate::di::{DisposeError, ResolveError, ServiceProvider};

mod builder;
mod loader;
mod middleware;
mod options;

pub use builder::{HostBuilder, HostBuilderContext};
pub use loader::{HostLoader, Startup};
pub use middleware::{
    delegate, ExecutionDelegate, ExecutionFuture, ExecutionMiddleware, FromServices, Middleware,
};
pub use options::{HostOptions, ALLOW_PARALLELIZATION_KEY};

/// Configuration errors raised while building or starting a host.
#[derive(Error, Debug)]
pub enum HostError {
    #[error("Failed to load configuration: {0:#}")]
    Configuration(anyhow::Error),

    #[error("Failed to resolve host services: {0}")]
    Resolve(#[from] ResolveError),

    #[error("Cannot build middleware '{name}': {source}")]
    Middleware {
        name: &'static str,
        source: ResolveError,
    },

    #[error("Startup '{name}' failed: {message}")]
    Startup { name: String, message: String },
}

pub struct Host {
    configuration: Configuration,
    services: ServiceProvider,
    options: HostOptions,
    middleware: Vec<Middleware>,
    adapters: AdapterRegistry,
}

impl Host {
    pub fn builder() -> HostBuilder {
        HostBuilder::new()
    }

    pub fn configuration(&self) -> &Configuration {
        &self.configuration
    }

    /// The root provider.
    pub fn services(&self) -> &ServiceProvider {
        &self.services
    }

    /// Options as bound when the host was built.
    pub fn options(&self) -> &HostOptions {
        &self.options
    }

    pub fn adapters(&self) -> &AdapterRegistry {
        &self.adapters
    }

    pub fn middleware(&self) -> &[Middleware] {
        &self.middleware
    }

    /// Build the pipeline around `terminal` and run it once.
    pub async fn run_async(self: &Arc<Self>, terminal: ExecutionDelegate) -> anyhow::Result<()> {
        let pipeline = middleware::build_pipeline(&self.middleware, &self.services, terminal)?;
        info!("Running host pipeline");
        pipeline(self.clone()).await
    }

    /// Dispose the root provider and every singleton it created.
    pub fn dispose(&self) -> Result<(), DisposeError> {
        self.services.dispose()
    }
}

impl fmt::Debug for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Host")
            .field("options", &self.options)
            .field("middleware", &self.middleware)
            .field("adapters", &self.adapters)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::{BoxFuture, FutureExt};
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Journal {
        entries: Mutex<Vec<String>>,
    }

    impl Journal {
        fn push(&self, entry: &str) {
            self.entries.lock().push(entry.to_string());
        }
    }

    fn host(configure: impl FnOnce(&mut HostBuilder)) -> Arc<Host> {
        let mut builder = Host::builder();
        builder.without_environment();
        configure(&mut builder);
        Arc::new(builder.build().unwrap())
    }

    fn recording(journal: &Arc<Journal>, name: &'static str) -> Middleware {
        let journal = journal.clone();
        Middleware::closure(move |host, next| {
            let journal = journal.clone();
            async move {
                journal.push(&format!("{name}:before"));
                next(host).await?;
                journal.push(&format!("{name}:after"));
                Ok(())
            }
        })
    }

    struct Timing {
        next: ExecutionDelegate,
    }

    impl ExecutionMiddleware for Timing {
        type Dependencies = Arc<Journal>;

        fn new(next: ExecutionDelegate) -> Self {
            Self { next }
        }

        fn invoke<'a>(
            &'a self,
            host: Arc<Host>,
            journal: &'a Arc<Journal>,
        ) -> BoxFuture<'a, anyhow::Result<()>> {
            async move {
                journal.push("component:before");
                (self.next)(host).await?;
                journal.push("component:after");
                Ok(())
            }
            .boxed()
        }
    }

    #[test]
    fn test_pipeline_runs_first_registered_outermost() {
        let journal = Arc::new(Journal::default());
        let host = host(|builder| {
            let shared = journal.clone();
            builder
                .configure_services(move |services| {
                    services.add_instance(shared);
                })
                .add_middleware(recording(&journal, "outer"))
                .use_component::<Timing>()
                .add_middleware(recording(&journal, "inner"));
        });

        let terminal_journal = journal.clone();
        let terminal = delegate(move |_host| {
            let journal = terminal_journal.clone();
            async move {
                journal.push("terminal");
                Ok(())
            }
        });
        tokio_test::block_on(host.run_async(terminal)).unwrap();

        assert_eq!(
            *journal.entries.lock(),
            vec![
                "outer:before",
                "component:before",
                "inner:before",
                "terminal",
                "inner:after",
                "component:after",
                "outer:after",
            ]
        );
    }

    #[test]
    fn test_component_dependencies_resolved_at_build() {
        let host = host(|builder| {
            builder.use_component::<Timing>();
        });
        let terminal = delegate(|_host| async { Ok(()) });

        let err = tokio_test::block_on(host.run_async(terminal)).unwrap_err();
        let err = err.downcast::<HostError>().unwrap();
        assert!(matches!(
            err,
            HostError::Middleware {
                source: ResolveError::NotRegistered(_),
                ..
            }
        ));
    }

    #[test]
    fn test_middleware_can_short_circuit() {
        let journal = Arc::new(Journal::default());
        let host = host(|builder| {
            builder.use_middleware(|_host, _next| async { anyhow::bail!("not today") });
        });

        let terminal_journal = journal.clone();
        let terminal = delegate(move |_host| {
            let journal = terminal_journal.clone();
            async move {
                journal.push("terminal");
                Ok(())
            }
        });

        let err = tokio_test::block_on(host.run_async(terminal)).unwrap_err();
        assert_eq!(err.to_string(), "not today");
        assert!(journal.entries.lock().is_empty());
    }

    #[test]
    fn test_configuration_services_and_options() {
        let host = host(|builder| {
            builder
                .configuration()
                .add_in_memory([(ALLOW_PARALLELIZATION_KEY, "false"), ("suite:name", "smoke")]);
            builder
                .configure_services_with(|ctx, services| {
                    let name = ctx.configuration().get("suite:name").unwrap_or("").to_string();
                    services.add_instance(Arc::new(name));
                })
                .configure_options(|options| {
                    assert!(!options.allow_test_parallelization);
                });
        });

        assert_eq!(host.configuration().get("SUITE:NAME"), Some("smoke"));
        assert_eq!(*host.services().resolve::<String>().unwrap(), "smoke");
        assert!(!host.options().allow_test_parallelization);
        assert!(host.services().resolve::<Configuration>().is_ok());

        // Options are per scope: a fresh snapshot for each scope, none at the root.
        let scope = host.services().create_scope();
        assert!(!HostOptions::current(&scope).allow_test_parallelization);
        assert!(matches!(
            host.services().resolve::<HostOptions>(),
            Err(ResolveError::ScopedFromRoot(_))
        ));
    }

    #[test]
    fn test_options_callbacks_run_in_order() {
        let host = host(|builder| {
            builder
                .configure_options(|options| options.allow_test_parallelization = false)
                .configure_options(|options| options.allow_test_parallelization = true);
        });
        assert!(host.options().allow_test_parallelization);
    }
}
