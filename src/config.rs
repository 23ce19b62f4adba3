//! Configuration management for the UTXO locker
//!
//! Loads configuration from TOML files with environment variable substitution.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub locker: LockerConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    pub bridges: HashMap<String, BridgeConfig>,
}

/// Defaults shared by every bridge
#[derive(Debug, Clone, Deserialize)]
pub struct LockerConfig {
    #[serde(default = "default_ttl_secs")]
    pub default_ttl_secs: u64,
    #[serde(default = "default_monitor_interval_secs")]
    pub monitor_interval_secs: u64,
    #[serde(default = "default_status_interval_secs")]
    pub status_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub json: bool,
}

/// One bridged token whose source chain spends UTXOs
#[derive(Debug, Clone, Deserialize)]
pub struct BridgeConfig {
    pub chain: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_true")]
    pub normalize_case: bool,
    pub default_ttl_secs: Option<u64>,
    pub monitor_interval_secs: Option<u64>,
}

fn default_ttl_secs() -> u64 {
    3600 * 120
}

fn default_monitor_interval_secs() -> u64 {
    60
}

fn default_status_interval_secs() -> u64 {
    300
}

fn default_true() -> bool {
    true
}

impl Default for LockerConfig {
    fn default() -> Self {
        Self {
            default_ttl_secs: default_ttl_secs(),
            monitor_interval_secs: default_monitor_interval_secs(),
            status_interval_secs: default_status_interval_secs(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 9102,
        }
    }
}

impl Settings {
    /// Load settings from `$UTXO_LOCKER_CONFIG` or `config/default.toml`
    pub fn load() -> Result<Self> {
        let config_path = env::var("UTXO_LOCKER_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config/default.toml"));

        Self::load_from(&config_path)
    }

    /// Load settings from a specific file
    pub fn load_from(config_path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

        Self::parse(&config_str)
    }

    /// Parse settings from TOML text
    pub fn parse(config_str: &str) -> Result<Self> {
        // Substitute environment variables
        let config_str = substitute_env_vars(config_str);

        let settings: Settings =
            toml::from_str(&config_str).with_context(|| "Failed to parse configuration")?;

        settings.validate()?;

        Ok(settings)
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        if self.enabled_bridges().is_empty() {
            anyhow::bail!("At least one bridge must be enabled");
        }

        if self.locker.default_ttl_secs == 0 {
            anyhow::bail!("locker.default_ttl_secs must be greater than zero");
        }
        if self.locker.monitor_interval_secs == 0 {
            anyhow::bail!("locker.monitor_interval_secs must be greater than zero");
        }
        if self.locker.status_interval_secs == 0 {
            anyhow::bail!("locker.status_interval_secs must be greater than zero");
        }

        for (name, bridge) in &self.bridges {
            if bridge.default_ttl_secs == Some(0) {
                anyhow::bail!("Bridge {} has a zero default_ttl_secs", name);
            }
            if bridge.monitor_interval_secs == Some(0) {
                anyhow::bail!("Bridge {} has a zero monitor_interval_secs", name);
            }
            if bridge.enabled && !bridge.normalize_case {
                tracing::warn!(
                    "Bridge {} keeps transaction hash casing - callers must pass canonical hashes",
                    name
                );
            }
        }

        Ok(())
    }

    /// Get list of enabled bridges, ordered by name
    pub fn enabled_bridges(&self) -> Vec<(&String, &BridgeConfig)> {
        let mut bridges: Vec<_> = self.bridges.iter().filter(|(_, b)| b.enabled).collect();
        bridges.sort_by(|a, b| a.0.cmp(b.0));
        bridges
    }
}

/// Substitute environment variables in the format ${VAR_NAME}
fn substitute_env_vars(input: &str) -> String {
    lazy_static::lazy_static! {
        static ref ENV_VAR: regex::Regex =
            regex::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").expect("valid env var pattern");
    }

    ENV_VAR
        .replace_all(input, |cap: &regex::Captures| {
            env::var(&cap[1]).unwrap_or_default()
        })
        .into_owned()
}
