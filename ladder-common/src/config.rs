//! Configuration management for the ladder allocator.
//!
//! The service reads a single configuration file at `~/.ladder/config.json`,
//! optionally extended by `~/.ladder/allocator.json` (see [`crate::config_loader`]).
//!
//! # Configuration Priority
//!
//! 1. Environment variables (LADDER_* prefix)
//! 2. Explicit config file values
//! 3. Default values
//!
//! # Environment Variable Mapping
//!
//! - `LADDER_HOST` → server.host
//! - `LADDER_PORT` → server.port
//! - `LADDER_LOG_LEVEL` → observability.log_level
//! - `LADDER_LOG_FORMAT` → observability.log_format
//! - `LADDER_BOOTSTRAP_CAP` → allocator.bootstrap_cap
//! - `LADDER_BENCHMARK` → allocator.benchmark_ticker

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Get the configuration directory path.
pub fn config_dir() -> PathBuf {
    directories::UserDirs::new().map_or_else(
        || PathBuf::from(".ladder"),
        |dirs| dirs.home_dir().join(".ladder"),
    )
}

/// Get the configuration file path.
pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

// ============================================================================
// Server Configuration
// ============================================================================

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind host
    #[serde(default = "default_host")]
    pub host: String,

    /// Bind port
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".into()
}

fn default_port() -> u16 {
    4480
}

// ============================================================================
// Observability Configuration
// ============================================================================

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level", alias = "level")]
    pub log_level: String,

    /// Log format (json, pretty)
    #[serde(default = "default_log_format", alias = "format")]
    pub log_format: String,

    /// Additional module targets to filter down to `warn`.
    #[serde(default)]
    pub excluded_targets: Vec<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
            excluded_targets: Vec::new(),
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "pretty".into()
}

// ============================================================================
// Allocator Section
// ============================================================================

/// Overrides for the allocation engine defaults.
///
/// Every field is optional; unset fields keep the engine's built-in values.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AllocatorSection {
    /// Max fraction of cash that new rungs may reserve in one cycle
    #[serde(default)]
    pub bootstrap_cap: Option<f64>,

    /// Ticker used for the global regime
    #[serde(default)]
    pub benchmark_ticker: Option<String>,

    /// Half-width of a banned zone around a rejected price (percent)
    #[serde(default)]
    pub banned_zone_tolerance_pct: Option<f64>,

    /// Price tolerance when matching existing orders
    #[serde(default)]
    pub price_epsilon: Option<f64>,

    /// Tickers that are classified but never traded
    #[serde(default)]
    pub monitor_only: Option<Vec<String>>,

    /// Tickers that are skipped entirely
    #[serde(default)]
    pub banned: Option<Vec<String>>,

    /// Tickers classified as crypto
    #[serde(default)]
    pub crypto_tickers: Option<Vec<String>>,

    /// Tickers classified as capped small caps
    #[serde(default)]
    pub smallcap_tickers: Option<Vec<String>>,

    #[serde(default)]
    pub crash_brakes: Option<CrashBrakeSection>,

    #[serde(default)]
    pub smallcap_caps: Option<SmallCapCapsSection>,

    #[serde(default)]
    pub stock_thresholds: Option<PhaseThresholdSection>,

    #[serde(default)]
    pub crypto_thresholds: Option<PhaseThresholdSection>,
}

/// Crash-protection overrides for dip-rung generation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CrashBrakeSection {
    #[serde(default)]
    pub stock_max_drawdown_pct: Option<f64>,
    #[serde(default)]
    pub stock_min_sma200_ratio: Option<f64>,
    #[serde(default)]
    pub crypto_max_drawdown_pct: Option<f64>,
    #[serde(default)]
    pub crypto_min_sma200_ratio: Option<f64>,
}

/// Exposure cap overrides for capped small caps (fractions of the pool).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SmallCapCapsSection {
    #[serde(default)]
    pub max_exposure_fraction: Option<f64>,
    #[serde(default)]
    pub max_ladder_fraction: Option<f64>,
    #[serde(default)]
    pub structural_rung_fraction: Option<f64>,
    #[serde(default)]
    pub sniper_rung_fraction: Option<f64>,
    #[serde(default)]
    pub max_rung_share: Option<f64>,
}

/// Phase threshold overrides shared by stock and crypto rule tables.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PhaseThresholdSection {
    #[serde(default)]
    pub catastrophic_sma200_ratio: Option<f64>,
    #[serde(default)]
    pub catastrophic_rsi: Option<f64>,
    #[serde(default)]
    pub catastrophic_volume_ratio: Option<f64>,
    #[serde(default)]
    pub meltup_sma200_ratio: Option<f64>,
    #[serde(default)]
    pub meltup_rsi: Option<f64>,
    #[serde(default)]
    pub meltup_volume_ratio: Option<f64>,
    #[serde(default)]
    pub reset_trim_floor: Option<f64>,
}

// ============================================================================
// Root Configuration
// ============================================================================

/// Root configuration shared by the ladder crates.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,

    #[serde(default)]
    pub allocator: Option<AllocatorSection>,
}

impl Config {
    /// Load configuration from the default directory.
    ///
    /// A missing directory or file yields defaults.
    pub fn load() -> Result<Self> {
        let dir = config_dir();
        if !dir.join("config.json").exists() && !dir.join("allocator.json").exists() {
            tracing::info!("Config file not found, using defaults");
            return Ok(Self::default());
        }
        Self::load_dir(&dir)
    }

    /// Load configuration from a specific directory, merging modular files.
    pub fn load_dir(dir: &Path) -> Result<Self> {
        let value = crate::config_loader::load_modular_config(Some(dir.to_path_buf()))?;
        serde_json::from_value(value)
            .with_context(|| format!("Failed to parse config from {}", dir.display()))
    }

    /// Load configuration from a specific file.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Load configuration with environment variable overrides applied.
    pub fn load_with_env() -> Result<Self> {
        let mut config = Self::load()?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary key lookup.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("LADDER_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("LADDER_PORT").and_then(|p| p.parse().ok()) {
            self.server.port = port;
        }
        if let Some(level) = lookup("LADDER_LOG_LEVEL") {
            self.observability.log_level = level;
        }
        if let Some(format) = lookup("LADDER_LOG_FORMAT") {
            self.observability.log_format = format;
        }
        if let Some(cap) = lookup("LADDER_BOOTSTRAP_CAP").and_then(|c| c.parse().ok()) {
            self.allocator
                .get_or_insert_with(AllocatorSection::default)
                .bootstrap_cap = Some(cap);
        }
        if let Some(benchmark) = lookup("LADDER_BENCHMARK") {
            self.allocator
                .get_or_insert_with(AllocatorSection::default)
                .benchmark_ticker = Some(benchmark);
        }
    }

    /// Save configuration to the default path.
    pub fn save(&self) -> Result<()> {
        let path = config_path();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let content = serde_json::to_string_pretty(self)?;
        fs::write(&path, content)
            .with_context(|| format!("Failed to write config to {}", path.display()))
    }

    /// Socket address string for the HTTP server.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.port, 4480);
        assert_eq!(config.observability.log_level, "info");
        assert!(config.allocator.is_none());
        assert_eq!(config.bind_address(), "127.0.0.1:4480");
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: Config = serde_json::from_str(
            r#"{"observability": {"level": "debug"}, "allocator": {"bootstrap_cap": 0.25}}"#,
        )
        .unwrap();
        assert_eq!(config.observability.log_level, "debug");
        assert_eq!(config.observability.log_format, "pretty");
        assert_eq!(config.allocator.unwrap().bootstrap_cap, Some(0.25));
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = [
            ("LADDER_PORT", "9000"),
            ("LADDER_BOOTSTRAP_CAP", "0.3"),
            ("LADDER_BENCHMARK", "QQQ"),
            ("LADDER_LOG_FORMAT", "json"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.observability.log_format, "json");
        let allocator = config.allocator.unwrap();
        assert_eq!(allocator.bootstrap_cap, Some(0.3));
        assert_eq!(allocator.benchmark_ticker.as_deref(), Some("QQQ"));
    }

    #[test]
    fn test_invalid_port_override_is_ignored() {
        let mut config = Config::default();
        config.apply_overrides(|key| (key == "LADDER_PORT").then(|| "not-a-port".to_string()));
        assert_eq!(config.server.port, 4480);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"server": {"port": 5001}}"#).unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.server.port, 5001);
        assert_eq!(config.server.host, "127.0.0.1");
    }

    #[test]
    fn test_load_from_malformed_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ server: ").unwrap();

        assert!(Config::load_from(&path).is_err());
    }
}
