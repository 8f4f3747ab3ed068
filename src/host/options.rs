//! Host options

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::{parse_bool, Configuration};
use crate::di::ServiceProvider;

/// Configuration key for [`HostOptions::allow_test_parallelization`].
pub const ALLOW_PARALLELIZATION_KEY: &str = "host:allow_test_parallelization";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostOptions {
    /// Whether sibling work units may run concurrently.
    pub allow_test_parallelization: bool,
}

impl Default for HostOptions {
    fn default() -> Self {
        Self {
            allow_test_parallelization: true,
        }
    }
}

impl HostOptions {
    /// Options bound from the `host` section.
    pub fn from_configuration(configuration: &Configuration) -> Self {
        let mut options = Self::default();
        if let Some(raw) = configuration.get(ALLOW_PARALLELIZATION_KEY) {
            match parse_bool(raw) {
                Some(value) => options.allow_test_parallelization = value,
                None => warn!("Ignoring invalid {} value '{}'", ALLOW_PARALLELIZATION_KEY, raw),
            }
        }
        options
    }

    /// A fresh snapshot from `services`, or the defaults when unavailable.
    pub fn current(services: &ServiceProvider) -> Self {
        match services.get::<HostOptions>() {
            Ok(Some(options)) => (*options).clone(),
            Ok(None) => Self::default(),
            Err(err) => {
                warn!("Using default host options: {}", err);
                Self::default()
            }
        }
    }
}
