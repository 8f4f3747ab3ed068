//! Host builder

use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info};

use super::middleware::{ExecutionDelegate, ExecutionMiddleware, Middleware};
use super::options::HostOptions;
use super::{Host, HostError};
use crate::adapters::{AdapterRegistry, TestCaseAdapter};
use crate::config::{Configuration, ConfigurationBuilder, ENV_PREFIX};
use crate::di::ServiceCollection;

type ServicesCallback = Box<dyn FnOnce(&HostBuilderContext, &mut ServiceCollection) + Send>;
type OptionsCallback = Arc<dyn Fn(&mut HostOptions) + Send + Sync>;

/// What service callbacks can see while the host is being built.
#[derive(Clone, Debug)]
pub struct HostBuilderContext {
    configuration: Configuration,
}

impl HostBuilderContext {
    pub fn configuration(&self) -> &Configuration {
        &self.configuration
    }
}

/// Collects configuration sources, service registrations, option callbacks
/// and middleware, then builds a [`Host`].
pub struct HostBuilder {
    configuration: ConfigurationBuilder,
    env_prefix: Option<String>,
    services: Vec<ServicesCallback>,
    options: Vec<OptionsCallback>,
    middleware: Vec<Middleware>,
}

impl HostBuilder {
    pub fn new() -> Self {
        Self {
            configuration: ConfigurationBuilder::new(),
            env_prefix: Some(ENV_PREFIX.to_string()),
            services: Vec::new(),
            options: Vec::new(),
            middleware: Vec::new(),
        }
    }

    /// Configuration sources. Environment variables are layered on top at
    /// build time.
    pub fn configuration(&mut self) -> &mut ConfigurationBuilder {
        &mut self.configuration
    }

    /// Read environment variables with `prefix` instead of `TESTHOST`.
    pub fn env_prefix(&mut self, prefix: impl Into<String>) -> &mut Self {
        self.env_prefix = Some(prefix.into());
        self
    }

    pub fn without_environment(&mut self) -> &mut Self {
        self.env_prefix = None;
        self
    }

    pub fn configure_services<F>(&mut self, configure: F) -> &mut Self
    where
        F: FnOnce(&mut ServiceCollection) + Send + 'static,
    {
        self.configure_services_with(move |_, services| configure(services))
    }

    /// Like [`configure_services`](Self::configure_services), with access to
    /// the built configuration.
    pub fn configure_services_with<F>(&mut self, configure: F) -> &mut Self
    where
        F: FnOnce(&HostBuilderContext, &mut ServiceCollection) + Send + 'static,
    {
        self.services.push(Box::new(configure));
        self
    }

    /// Adjust the options after they are bound from configuration. Runs in
    /// registration order, again for every fresh options snapshot.
    pub fn configure_options<F>(&mut self, configure: F) -> &mut Self
    where
        F: Fn(&mut HostOptions) + Send + Sync + 'static,
    {
        self.options.push(Arc::new(configure));
        self
    }

    /// Add a `(host, next)` middleware closure.
    pub fn use_middleware<F, Fut>(&mut self, middleware: F) -> &mut Self
    where
        F: Fn(Arc<Host>, ExecutionDelegate) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.add_middleware(Middleware::closure(middleware))
    }

    /// Add a middleware component, constructed each time the pipeline is built.
    pub fn use_component<M: ExecutionMiddleware>(&mut self) -> &mut Self {
        self.add_middleware(Middleware::component::<M>())
    }

    pub fn add_middleware(&mut self, middleware: Middleware) -> &mut Self {
        self.middleware.push(middleware);
        self
    }

    /// Register a test case adapter. Later adapters take precedence.
    pub fn add_adapter(&mut self, adapter: Arc<dyn TestCaseAdapter>) -> &mut Self {
        self.configure_services(move |services| {
            services.add_instance::<dyn TestCaseAdapter>(adapter);
        })
    }

    pub fn build(mut self) -> Result<Host, HostError> {
        if let Some(prefix) = self.env_prefix.take() {
            self.configuration.add_env(prefix);
        }
        let configuration = self
            .configuration
            .build()
            .map_err(HostError::Configuration)?;

        let callbacks = Arc::new(self.options);
        let options = bind_options(&configuration, &callbacks);

        let mut services = ServiceCollection::new();
        services.add_instance(Arc::new(configuration.clone()));
        {
            let configuration = configuration.clone();
            services.add_scoped::<HostOptions, _>(move |_| {
                Ok(Arc::new(bind_options(&configuration, &callbacks)))
            });
        }

        let context = HostBuilderContext {
            configuration: configuration.clone(),
        };
        for configure in self.services {
            configure(&context, &mut services);
        }
        debug!("Registered {} services", services.len());

        let root = services.build();
        let adapters = AdapterRegistry::from_services(&root)?;
        info!(
            "Host built: {} adapters, {} middleware, parallelization {}",
            adapters.len(),
            self.middleware.len(),
            if options.allow_test_parallelization {
                "on"
            } else {
                "off"
            }
        );

        Ok(Host {
            configuration,
            services: root,
            options,
            middleware: self.middleware,
            adapters,
        })
    }
}

impl Default for HostBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn bind_options(configuration: &Configuration, callbacks: &[OptionsCallback]) -> HostOptions {
    let mut options = HostOptions::from_configuration(configuration);
    for configure in callbacks {
        configure(&mut options);
    }
    options
}
