//! Registry of provider factories.
//!
//! Maps a provider name (the `type` of a provider section in the settings
//! file) to a factory decoding that section's parameters into a
//! [`ProviderConfiguration`]. The registry is an explicit value handed to
//! whoever decodes settings; there is no global registration.
//!
//! ```rust
//! # use flowmeta::providers::ProviderRegistry;
//! let registry = ProviderRegistry::with_builtin();
//! let configuration = registry
//!     .configuration("static", serde_json::json!({ "exporters": [] }))
//!     .unwrap();
//! assert_eq!(configuration.name(), "static");
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use super::static_table::StaticConfiguration;
use super::traits::ProviderConfiguration;
use crate::{MetadataError, Result};

/// Turns provider parameters into a provider configuration.
pub type ProviderFactory =
    Arc<dyn Fn(Value) -> Result<Arc<dyn ProviderConfiguration>> + Send + Sync>;

/// Named provider factories.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    factories: HashMap<String, ProviderFactory>,
}

impl ProviderRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry knowing the providers shipped with this crate.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(
            "static",
            Arc::new(|params: Value| -> Result<Arc<dyn ProviderConfiguration>> {
                let configuration: StaticConfiguration =
                    serde_json::from_value(params).map_err(|e| {
                        MetadataError::Configuration(format!("invalid static provider: {e}"))
                    })?;
                configuration.validate()?;
                Ok(Arc::new(configuration) as Arc<dyn ProviderConfiguration>)
            }),
        );
        registry
    }

    /// Register (or replace) the factory for `name`.
    pub fn register(&mut self, name: impl Into<String>, factory: ProviderFactory) {
        self.factories.insert(name.into(), factory);
    }

    /// Whether a factory exists for `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered provider names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Decode `params` with the factory registered under `name`.
    pub fn configuration(
        &self,
        name: &str,
        params: Value,
    ) -> Result<Arc<dyn ProviderConfiguration>> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| MetadataError::UnknownProvider(name.to_string()))?;
        factory(params)
    }
}
