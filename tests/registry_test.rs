use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};

use flowmeta::providers::{
    Provider, ProviderConfiguration, ProviderContext, ProviderRegistry,
};
use flowmeta::{BatchQuery, MetadataError, Result};

struct Null {
    label: String,
}

#[async_trait]
impl Provider for Null {
    fn name(&self) -> &str {
        "null"
    }

    async fn query(&self, _query: &BatchQuery) -> Result<()> {
        Ok(())
    }
}

impl ProviderConfiguration for Null {
    fn name(&self) -> &str {
        &self.label
    }

    fn build(&self, _ctx: ProviderContext) -> Result<Arc<dyn Provider>> {
        Ok(Arc::new(Null {
            label: self.label.clone(),
        }))
    }
}

fn null_factory(params: Value) -> Result<Arc<dyn ProviderConfiguration>> {
    let label = params
        .get("label")
        .and_then(Value::as_str)
        .ok_or_else(|| MetadataError::Configuration("null provider needs a label".into()))?;
    Ok(Arc::new(Null {
        label: label.to_string(),
    }))
}

#[test]
fn empty_registry() {
    let registry = ProviderRegistry::new();
    assert!(!registry.contains("static"));
    assert!(registry.names().is_empty());
}

#[test]
fn builtin_providers() {
    let registry = ProviderRegistry::with_builtin();
    assert!(registry.contains("static"));
    assert!(!registry.contains("snmp"));
}

#[test]
fn unknown_provider() {
    let registry = ProviderRegistry::with_builtin();
    let err = registry.configuration("snmp", json!({})).err().unwrap();
    assert!(matches!(err, MetadataError::UnknownProvider(ref name) if name == "snmp"));
}

#[test]
fn register_custom_factory() {
    let mut registry = ProviderRegistry::with_builtin();
    registry.register("null", Arc::new(null_factory));
    assert_eq!(registry.names(), vec!["null", "static"]);

    let configuration = registry
        .configuration("null", json!({ "label": "custom" }))
        .unwrap();
    assert_eq!(configuration.name(), "custom");

    let err = registry.configuration("null", json!({})).err().unwrap();
    assert!(matches!(err, MetadataError::Configuration(_)));
}

#[test]
fn register_replaces_existing_factory() {
    let mut registry = ProviderRegistry::with_builtin();
    registry.register("static", Arc::new(null_factory));
    assert_eq!(registry.names(), vec!["static"]);

    let configuration = registry
        .configuration("static", json!({ "label": "override" }))
        .unwrap();
    assert_eq!(configuration.name(), "override");
}

#[test]
fn static_parameters_are_validated() {
    let registry = ProviderRegistry::with_builtin();
    let err = registry
        .configuration(
            "static",
            json!({ "exporters": [
                { "subnet": "192.0.2.0/24", "name": "a" },
                { "subnet": "192.0.2.0/24", "name": "b" }
            ] }),
        )
        .err()
        .unwrap();
    assert!(matches!(err, MetadataError::Configuration(_)));
}
