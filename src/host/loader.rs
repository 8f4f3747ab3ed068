//! Startups and host loading

use std::sync::Arc;
use tracing::{debug, info};

use super::{Host, HostBuilder, HostError};
use crate::adapters::TheoryTestCaseAdapter;
use crate::models::{MessageBus, TestOutput};
use crate::scope::ScopeLevel;

/// Hooks a test assembly uses to shape its host.
pub trait Startup: Send + Sync {
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Called before the host is built.
    fn configure_host(&self, _builder: &mut HostBuilder) {}

    /// Called once the host is built.
    fn configure(&self, _host: &Host) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Builds the host for a run: defaults first, then every startup in order.
pub struct HostLoader;

impl HostLoader {
    /// A builder with the default registrations: the message bus, the
    /// theory adapter and a `Case`-owned [`TestOutput`].
    pub fn default_builder(bus: Arc<dyn MessageBus>) -> HostBuilder {
        let mut builder = HostBuilder::new();
        builder
            .configure_services(move |services| {
                services
                    .add_instance::<dyn MessageBus>(bus)
                    .add_lifetime_scoped::<TestOutput, _>(ScopeLevel::Case, |_| {
                        Ok(Arc::new(TestOutput::new()))
                    });
            })
            .add_adapter(Arc::new(TheoryTestCaseAdapter));
        builder
    }

    pub fn create_host(
        startups: &[Arc<dyn Startup>],
        bus: Arc<dyn MessageBus>,
    ) -> Result<Arc<Host>, HostError> {
        Self::create_host_with(Self::default_builder(bus), startups)
    }

    /// Apply `startups` to `builder`, build, then let each startup configure
    /// the built host.
    pub fn create_host_with(
        mut builder: HostBuilder,
        startups: &[Arc<dyn Startup>],
    ) -> Result<Arc<Host>, HostError> {
        for startup in startups {
            debug!("Configuring host with startup {}", startup.name());
            startup.configure_host(&mut builder);
        }

        let host = builder.build()?;
        for startup in startups {
            startup
                .configure(&host)
                .map_err(|err| HostError::Startup {
                    name: startup.name().to_string(),
                    message: format!("{err:#}"),
                })?;
        }

        info!("Host created with {} startups", startups.len());
        Ok(Arc::new(host))
    }
}
