//! Configuration files
//!
//! YAML or JSON documents flattened into `section:key` pairs.

use anyhow::{Context, Result};
use serde_json::Value;
use std::path::Path;

fn is_yaml(path: &Path) -> bool {
    path.extension()
        .map(|e| e == "yaml" || e == "yml")
        .unwrap_or(false)
}

/// Load `path` and flatten it. YAML for `.yaml`/`.yml`, JSON otherwise.
pub fn load_file(path: impl AsRef<Path>) -> Result<Vec<(String, String)>> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;

    let document: Value = if is_yaml(path) {
        serde_yaml::from_str(&content).context("Failed to parse YAML config")?
    } else {
        serde_json::from_str(&content).context("Failed to parse JSON config")?
    };

    let mut pairs = Vec::new();
    flatten("", &document, &mut pairs);
    Ok(pairs)
}

/// Flatten nested maps and arrays into `a:b:0` style keys.
pub fn flatten(prefix: &str, value: &Value, out: &mut Vec<(String, String)>) {
    let join = |key: &str| {
        if prefix.is_empty() {
            key.to_string()
        } else {
            format!("{prefix}:{key}")
        }
    };

    match value {
        Value::Object(map) => {
            for (key, child) in map {
                flatten(&join(key), child, out);
            }
        }
        Value::Array(items) => {
            for (index, child) in items.iter().enumerate() {
                flatten(&join(&index.to_string()), child, out);
            }
        }
        Value::Null => out.push((prefix.to_string(), String::new())),
        Value::String(s) => out.push((prefix.to_string(), s.clone())),
        other => out.push((prefix.to_string(), other.to_string())),
    }
}
