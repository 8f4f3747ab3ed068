//! Environment variable configuration
//!
//! `TESTHOST_HOST__ALLOW_TEST_PARALLELIZATION=false` becomes the key
//! `host:allow_test_parallelization`.

use std::env;

/// Environment variable prefix
pub const ENV_PREFIX: &str = "TESTHOST";

/// Every variable starting with `{prefix}_`, as configuration pairs.
pub fn load_env(prefix: &str) -> Vec<(String, String)> {
    let marker = format!("{prefix}_");
    env::vars()
        .filter_map(|(name, value)| {
            name.strip_prefix(&marker)
                .filter(|rest| !rest.is_empty())
                .map(|rest| (rest.replace("__", ":").to_lowercase(), value))
        })
        .collect()
}

/// Parse the usual spellings of a boolean.
pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" | "enabled" => Some(true),
        "0" | "false" | "no" | "off" | "disabled" => Some(false),
        _ => None,
    }
}

/// Builder for setting prefixed environment variables (useful for testing)
pub struct EnvBuilder {
    prefix: String,
    vars: Vec<(String, String)>,
}

impl EnvBuilder {
    pub fn new() -> Self {
        Self::with_prefix(ENV_PREFIX)
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            vars: Vec::new(),
        }
    }

    /// Set `{prefix}_{name}`
    pub fn var(mut self, name: &str, value: impl ToString) -> Self {
        self.vars
            .push((format!("{}_{}", self.prefix, name), value.to_string()));
        self
    }

    /// Set the parallelization switch
    pub fn parallel(self, parallel: bool) -> Self {
        self.var("HOST__ALLOW_TEST_PARALLELIZATION", parallel)
    }

    /// Apply environment variables
    pub fn apply(self) {
        for (key, value) in self.vars {
            env::set_var(key, value);
        }
    }

    /// Apply and return guard that restores on drop
    pub fn apply_scoped(self) -> EnvGuard {
        let previous: Vec<_> = self
            .vars
            .iter()
            .map(|(k, _)| (k.clone(), env::var(k).ok()))
            .collect();

        self.apply();

        EnvGuard { previous }
    }
}

impl Default for EnvBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Guard that restores environment variables on drop
pub struct EnvGuard {
    previous: Vec<(String, Option<String>)>,
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, value) in &self.previous {
            match value {
                Some(v) => env::set_var(key, v),
                None => env::remove_var(key),
            }
        }
    }
}
