//! Configuration module
//!
//! Layered key/value configuration. Keys are `section:key` paths and are
//! matched case-insensitively; later layers override earlier ones.

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

pub mod env;
pub mod file;

pub use env::{parse_bool, EnvBuilder, EnvGuard, ENV_PREFIX};

/// Immutable flattened configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Configuration {
    values: BTreeMap<String, String>,
}

impl Configuration {
    pub fn builder() -> ConfigurationBuilder {
        ConfigurationBuilder::new()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(&key.to_lowercase()).map(String::as_str)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(parse_bool)
    }

    /// Parse the value at `key`. Missing keys are `Ok(None)`.
    pub fn get_parsed<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        self.get(key)
            .map(|raw| {
                raw.parse::<T>()
                    .with_context(|| format!("Invalid value '{raw}' for '{key}'"))
            })
            .transpose()
    }

    /// Every key under `name`, with the section prefix removed.
    pub fn section(&self, name: &str) -> Configuration {
        let prefix = format!("{}:", name.to_lowercase());
        let values = self
            .values
            .iter()
            .filter_map(|(k, v)| k.strip_prefix(&prefix).map(|rest| (rest.to_string(), v.clone())))
            .collect();
        Configuration { values }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

enum Source {
    File { path: PathBuf, optional: bool },
    Env { prefix: String },
    Memory(Vec<(String, String)>),
}

/// Ordered configuration sources, loaded at [`ConfigurationBuilder::build`].
#[derive(Default)]
pub struct ConfigurationBuilder {
    sources: Vec<Source>,
}

impl ConfigurationBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// YAML (`.yaml`/`.yml`) or JSON file that must exist.
    pub fn add_file(&mut self, path: impl AsRef<Path>) -> &mut Self {
        self.sources.push(Source::File {
            path: path.as_ref().to_path_buf(),
            optional: false,
        });
        self
    }

    /// Like [`add_file`](Self::add_file), skipped when the file is missing.
    pub fn add_optional_file(&mut self, path: impl AsRef<Path>) -> &mut Self {
        self.sources.push(Source::File {
            path: path.as_ref().to_path_buf(),
            optional: true,
        });
        self
    }

    /// Variables named `{prefix}_SECTION__KEY`.
    pub fn add_env(&mut self, prefix: impl Into<String>) -> &mut Self {
        self.sources.push(Source::Env {
            prefix: prefix.into(),
        });
        self
    }

    pub fn add_in_memory<K, V>(&mut self, pairs: impl IntoIterator<Item = (K, V)>) -> &mut Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let pairs = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self.sources.push(Source::Memory(pairs));
        self
    }

    pub fn build(&self) -> Result<Configuration> {
        let mut values = BTreeMap::new();
        for source in &self.sources {
            let pairs = match source {
                Source::File { path, optional } => {
                    if *optional && !path.exists() {
                        debug!("Optional config file {} not found", path.display());
                        continue;
                    }
                    file::load_file(path)?
                }
                Source::Env { prefix } => env::load_env(prefix),
                Source::Memory(pairs) => pairs.clone(),
            };
            for (key, value) in pairs {
                values.insert(key.to_lowercase(), value);
            }
        }
        debug!("Loaded {} configuration values", values.len());
        Ok(Configuration { values })
    }
}
