//! Metadata returned for an exporter interface

use serde::{Deserialize, Serialize};

/// Which side of the network an interface faces.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterfaceBoundary {
    #[default]
    Undefined,
    External,
    Internal,
}

/// Attributes of one interface.
///
/// An empty name or a zero speed means the attribute is unknown.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct Interface {
    pub name: String,
    pub description: String,
    /// Speed in Mbps.
    pub speed: u64,
    /// Transit or peering provider reached through this interface.
    pub provider: String,
    /// Connectivity type (e.g. "transit", "pni", "ix").
    pub connectivity: String,
    pub boundary: InterfaceBoundary,
}

/// Attributes of the exporting device.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct Exporter {
    /// Hostname of the exporter.
    pub name: String,
    /// General location of the exporter.
    pub region: String,
    pub role: String,
    /// Owner of the exporter.
    pub tenant: String,
    pub site: String,
    /// Functional or organisational grouping.
    pub group: String,
}

/// Resolved metadata for one query.
///
/// `Answer::default()` is the zero answer: it is what a miss looks like, and
/// what a provider reports to record a deliberate negative result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct Answer {
    pub exporter: Exporter,
    pub interface: Interface,
}

impl Answer {
    /// Answer carrying only an exporter name and interface attributes.
    pub fn new(exporter_name: impl Into<String>, interface: Interface) -> Self {
        Self {
            exporter: Exporter {
                name: exporter_name.into(),
                ..Default::default()
            },
            interface,
        }
    }

    /// Whether this is the zero answer.
    pub fn is_empty(&self) -> bool {
        *self == Answer::default()
    }
}

impl Interface {
    /// Interface with a name, a description and a speed.
    pub fn new(name: impl Into<String>, description: impl Into<String>, speed: u64) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            speed,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_answer_is_empty() {
        assert!(Answer::default().is_empty());
        assert!(!Answer::new("router", Interface::default()).is_empty());
    }

    #[test]
    fn boundary_serializes_lowercase() {
        let json = serde_json::to_string(&InterfaceBoundary::External).unwrap();
        assert_eq!(json, "\"external\"");
    }

    #[test]
    fn interface_deserializes_with_missing_fields() {
        let iface: Interface =
            serde_json::from_str(r#"{"name": "Gi0/0/0/1", "speed": 1000}"#).unwrap();
        assert_eq!(iface, Interface::new("Gi0/0/0/1", "", 1000));
    }
}
