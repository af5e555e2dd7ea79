//! Modular configuration loader.
//!
//! Supports splitting configuration across two files:
//! - `config.json` - Server and logging configuration
//! - `allocator.json` - Allocation engine overrides, merged under `allocator`
//!
//! Files are loaded from `~/.ladder/` unless a directory is given.

use anyhow::{Context, Result};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::config_dir;

/// Configuration file names, in merge order.
pub const CONFIG_FILES: &[&str] = &["config.json", "allocator.json"];

/// Load a JSON file and return its contents as a Value.
/// Returns None if the file doesn't exist.
fn load_json_file(path: &Path) -> Result<Option<Value>> {
    if !path.exists() {
        return Ok(None);
    }

    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;

    let value: Value = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))?;

    Ok(Some(value))
}

/// Deep merge two JSON values. Source wins on conflicts; objects merge per key.
pub fn merge_json(target: &mut Value, source: Value) {
    match (target, source) {
        (Value::Object(target_map), Value::Object(source_map)) => {
            for (key, source_value) in source_map {
                match target_map.get_mut(&key) {
                    Some(target_value) => merge_json(target_value, source_value),
                    None => {
                        target_map.insert(key, source_value);
                    }
                }
            }
        }
        (target, source) => {
            *target = source;
        }
    }
}

/// Load modular configuration from the config directory.
///
/// Priority (lowest to highest):
/// 1. `config.json`
/// 2. `allocator.json` (merged into the `allocator` key)
/// 3. Environment variables (applied separately)
pub fn load_modular_config(dir: Option<PathBuf>) -> Result<Value> {
    let cfg_dir = dir.unwrap_or_else(config_dir);

    tracing::debug!("Loading modular config from {}", cfg_dir.display());

    let mut config = load_json_file(&cfg_dir.join("config.json"))?
        .unwrap_or_else(|| Value::Object(Default::default()));

    if let Some(allocator) = load_json_file(&cfg_dir.join("allocator.json"))? {
        if let Some(config_obj) = config.as_object_mut() {
            match config_obj.get_mut("allocator") {
                Some(existing) if existing.is_object() => merge_json(existing, allocator),
                _ => {
                    config_obj.insert("allocator".to_string(), allocator);
                }
            }
        }
        tracing::debug!("Loaded allocator.json");
    }

    Ok(config)
}
