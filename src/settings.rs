//! On-disk settings.
//!
//! The `flowmeta` binary reads a TOML file with the following resolution
//! order:
//! 1. `--config <path>` (CLI flag)
//! 2. `~/.config/flowmeta/config.toml` (user)
//! 3. `/etc/flowmeta/config.toml` (system)
//!
//! ```toml
//! [metadata]
//! cache_duration_secs = 1800
//! workers = 2
//!
//! [provider]
//! type = "static"
//!
//! [[provider.exporters]]
//! subnet = "192.0.2.0/24"
//! name = "edge1"
//! default = { name = "unknown", speed = 0 }
//! interfaces = [{ if_index = 10, name = "Gi0/0/0/1", description = "Transit", speed = 1000 }]
//! ```
//!
//! Several providers are chained with `[[providers]]` tables instead of a
//! single `[provider]`; they are queried in order.
//!
//! Durations are integers (`*_secs`, `*_ms`); every field has a default.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};

use crate::breaker::BreakerConfig;
use crate::config::Configuration;
use crate::providers::{ProviderConfiguration, ProviderRegistry};
use crate::Result;

/// Settings file content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub metadata: MetadataSettings,
    /// Providers, queried in order. A single `[provider]` table is accepted
    /// as a chain of one.
    #[serde(
        default = "default_providers",
        alias = "provider",
        deserialize_with = "one_or_many"
    )]
    pub providers: Vec<ProviderSettings>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            metadata: MetadataSettings::default(),
            providers: default_providers(),
        }
    }
}

fn default_providers() -> Vec<ProviderSettings> {
    vec![ProviderSettings::default()]
}

fn one_or_many<'de, D>(deserializer: D) -> std::result::Result<Vec<ProviderSettings>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(ProviderSettings),
        Many(Vec<ProviderSettings>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(provider) => vec![provider],
        OneOrMany::Many(providers) => providers,
    })
}

/// Engine tunables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataSettings {
    /// Expiry of entries nobody looks up (default: 1800).
    #[serde(default = "default_cache_duration")]
    pub cache_duration_secs: u64,
    /// Refresh age, 0 disables refresh (default: 3600).
    #[serde(default = "default_cache_refresh")]
    pub cache_refresh_secs: u64,
    /// Maintenance period (default: 120).
    #[serde(default = "default_cache_check_interval")]
    pub cache_check_interval_secs: u64,
    #[serde(default)]
    pub cache_persist_file: Option<PathBuf>,
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_max_batch_requests")]
    pub max_batch_requests: usize,
    /// Provider query timeout in milliseconds (default: 5000).
    #[serde(default = "default_query_timeout")]
    pub query_timeout_ms: u64,
    /// Startup grace period for provider queries (default: 60).
    #[serde(default = "default_initial_delay")]
    pub initial_delay_secs: u64,
    #[serde(default)]
    pub breaker: BreakerSettings,
}

impl Default for MetadataSettings {
    fn default() -> Self {
        Self {
            cache_duration_secs: default_cache_duration(),
            cache_refresh_secs: default_cache_refresh(),
            cache_check_interval_secs: default_cache_check_interval(),
            cache_persist_file: None,
            workers: default_workers(),
            max_batch_requests: default_max_batch_requests(),
            query_timeout_ms: default_query_timeout(),
            initial_delay_secs: default_initial_delay(),
            breaker: BreakerSettings::default(),
        }
    }
}

fn default_cache_duration() -> u64 {
    30 * 60
}

fn default_cache_refresh() -> u64 {
    60 * 60
}

fn default_cache_check_interval() -> u64 {
    2 * 60
}

fn default_workers() -> usize {
    1
}

fn default_max_batch_requests() -> usize {
    10
}

fn default_query_timeout() -> u64 {
    5000
}

fn default_initial_delay() -> u64 {
    60
}

/// Breaker thresholds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakerSettings {
    #[serde(default = "default_error_threshold")]
    pub error_threshold: u32,
    #[serde(default = "default_success_threshold")]
    pub success_threshold: u32,
    #[serde(default = "default_breaker_timeout")]
    pub timeout_secs: u64,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            error_threshold: default_error_threshold(),
            success_threshold: default_success_threshold(),
            timeout_secs: default_breaker_timeout(),
        }
    }
}

fn default_error_threshold() -> u32 {
    20
}

fn default_success_threshold() -> u32 {
    1
}

fn default_breaker_timeout() -> u64 {
    60
}

/// Provider selection: `type` names a registered provider, the other keys
/// are its parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderSettings {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(flatten)]
    pub params: serde_json::Map<String, serde_json::Value>,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            kind: "static".to_string(),
            params: serde_json::Map::new(),
        }
    }
}

impl Settings {
    /// Runtime configuration, validated.
    pub fn configuration(&self) -> Result<Configuration> {
        let m = &self.metadata;
        let configuration = Configuration {
            cache_duration: Duration::from_secs(m.cache_duration_secs),
            cache_refresh: Duration::from_secs(m.cache_refresh_secs),
            cache_check_interval: Duration::from_secs(m.cache_check_interval_secs),
            cache_persist_file: m.cache_persist_file.clone(),
            workers: m.workers,
            max_batch_requests: m.max_batch_requests,
            query_timeout: Duration::from_millis(m.query_timeout_ms),
            initial_delay: Duration::from_secs(m.initial_delay_secs),
            breaker: BreakerConfig {
                error_threshold: m.breaker.error_threshold,
                success_threshold: m.breaker.success_threshold,
                timeout: Duration::from_secs(m.breaker.timeout_secs),
            },
        };
        configuration.validate()?;
        Ok(configuration)
    }

    /// Decode the provider sections with `registry`, in order.
    pub fn providers(
        &self,
        registry: &ProviderRegistry,
    ) -> Result<Vec<Arc<dyn ProviderConfiguration>>> {
        self.providers
            .iter()
            .map(|provider| {
                registry.configuration(
                    &provider.kind,
                    serde_json::Value::Object(provider.params.clone()),
                )
            })
            .collect()
    }
}

#[cfg(feature = "cli")]
mod file {
    use std::fs;
    use std::path::{Path, PathBuf};

    use super::Settings;
    use crate::{MetadataError, Result};

    impl Settings {
        /// Load settings from the standard locations.
        ///
        /// Resolution order:
        /// 1. Explicit path (if provided)
        /// 2. `~/.config/flowmeta/config.toml`
        /// 3. `/etc/flowmeta/config.toml`
        pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
            let path = Self::resolve_path(explicit_path)?;
            Self::load_from_file(&path)
        }

        /// Parse one TOML file.
        pub fn load_from_file(path: &Path) -> Result<Self> {
            let content = fs::read_to_string(path).map_err(|e| {
                MetadataError::Configuration(format!("Failed to read config file {path:?}: {e}"))
            })?;
            toml::from_str(&content).map_err(|e| {
                MetadataError::Configuration(format!("Failed to parse config file {path:?}: {e}"))
            })
        }

        fn resolve_path(explicit: Option<&Path>) -> Result<PathBuf> {
            if let Some(path) = explicit {
                if path.exists() {
                    return Ok(path.to_path_buf());
                }
                return Err(MetadataError::Configuration(format!(
                    "Config file not found: {path:?}"
                )));
            }

            if let Some(config) = dirs::config_dir() {
                let user_config = config.join("flowmeta").join("config.toml");
                if user_config.exists() {
                    return Ok(user_config);
                }
            }

            let system_config = PathBuf::from("/etc/flowmeta/config.toml");
            if system_config.exists() {
                return Ok(system_config);
            }

            Err(MetadataError::Configuration(
                "No config file found. Create ~/.config/flowmeta/config.toml or /etc/flowmeta/config.toml"
                    .to_string(),
            ))
        }
    }
}
