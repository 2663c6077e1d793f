//! Provider answering from a configured table.
//!
//! Exporters are matched by subnet, longest prefix first, so a catch-all
//! entry for a whole management network can coexist with more specific
//! ones. Within a matched exporter, an interface index missing from the
//! table is answered with the exporter's `default` interface.
//!
//! Exporters matching no entry are handed to the next provider with
//! [`MetadataError::SkipProvider`]. When no provider is left, the query
//! succeeds without an answer, so the breaker never trips on them.

use std::collections::HashMap;
use std::fmt;
use std::net::Ipv6Addr;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize};

use super::traits::{Provider, ProviderConfiguration, ProviderContext, Put};
use crate::types::{Answer, BatchQuery, Exporter, Interface, Query, Update};
use crate::{MetadataError, Result};

/// An IPv4 or IPv6 prefix matching exporter addresses.
///
/// IPv4 prefixes match the IPv4-mapped form [`Query`] keys use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Subnet(IpNetwork);

impl Subnet {
    /// Prefix length, in the address family of the subnet.
    pub fn prefix(&self) -> u8 {
        self.0.prefix()
    }

    /// Whether `ip` (canonical IPv6 form) belongs to this subnet.
    pub fn contains(&self, ip: Ipv6Addr) -> bool {
        match (self.0, ip.to_ipv4_mapped()) {
            (IpNetwork::V4(network), Some(v4)) => network.contains(v4),
            (IpNetwork::V4(_), None) => false,
            (IpNetwork::V6(network), _) => network.contains(ip),
        }
    }

    /// Prefix length once mapped into the IPv6 space, used to rank matches
    /// across families.
    fn rank(&self) -> u8 {
        match self.0 {
            IpNetwork::V4(network) => network.prefix() + 96,
            IpNetwork::V6(network) => network.prefix(),
        }
    }
}

impl FromStr for Subnet {
    type Err = MetadataError;

    /// Parse `a.b.c.d/n`, `x::y/n` or a bare address (host route). Host
    /// bits are cleared.
    fn from_str(s: &str) -> Result<Self> {
        let network: IpNetwork = s
            .parse()
            .map_err(|e| MetadataError::Configuration(format!("invalid subnet {s:?}: {e}")))?;
        let network = IpNetwork::new(network.network(), network.prefix())
            .map_err(|e| MetadataError::Configuration(format!("invalid subnet {s:?}: {e}")))?;
        Ok(Self(network))
    }
}

impl TryFrom<String> for Subnet {
    type Error = MetadataError;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<Subnet> for String {
    fn from(subnet: Subnet) -> Self {
        subnet.to_string()
    }
}

impl fmt::Display for Subnet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.0.network(), self.0.prefix())
    }
}

/// One interface entry of a static exporter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticInterface {
    pub if_index: u32,
    #[serde(flatten)]
    pub interface: Interface,
}

/// One exporter (or group of exporters) of the static table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticExporter {
    pub subnet: Subnet,
    #[serde(flatten)]
    pub exporter: Exporter,
    /// Answer for interface indexes not listed in `interfaces`.
    #[serde(default)]
    pub default: Interface,
    #[serde(default)]
    pub interfaces: Vec<StaticInterface>,
    /// Leave interfaces not listed in `interfaces` to the next provider
    /// instead of answering them with `default`.
    #[serde(default)]
    pub skip_missing_interfaces: bool,
}

/// Configuration of the static provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticConfiguration {
    #[serde(default)]
    pub exporters: Vec<StaticExporter>,
}

impl StaticConfiguration {
    /// Check every exporter has a name, subnets are not repeated and
    /// `default` is not combined with `skip_missing_interfaces`.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashMap::new();
        for exporter in &self.exporters {
            if exporter.exporter.name.is_empty() {
                return Err(MetadataError::Configuration(format!(
                    "static exporter {} has no name",
                    exporter.subnet
                )));
            }
            if exporter.skip_missing_interfaces && exporter.default != Interface::default() {
                return Err(MetadataError::Configuration(format!(
                    "static exporter {} cannot both skip missing interfaces and have a default",
                    exporter.exporter.name
                )));
            }
            if let Some(previous) = seen.insert(exporter.subnet, &exporter.exporter.name) {
                return Err(MetadataError::Configuration(format!(
                    "subnet {} used by both {previous} and {}",
                    exporter.subnet, exporter.exporter.name
                )));
            }
        }
        Ok(())
    }
}

impl ProviderConfiguration for StaticConfiguration {
    fn name(&self) -> &str {
        "static"
    }

    fn build(&self, ctx: ProviderContext) -> Result<Arc<dyn Provider>> {
        self.validate()?;
        Ok(Arc::new(StaticProvider::new(self, ctx.put)))
    }
}

struct Entry {
    subnet: Subnet,
    exporter: Exporter,
    default: Interface,
    interfaces: HashMap<u32, Interface>,
    skip_missing_interfaces: bool,
}

/// Provider backed by a [`StaticConfiguration`].
pub struct StaticProvider {
    entries: Vec<Entry>,
    put: Put,
}

impl StaticProvider {
    pub fn new(configuration: &StaticConfiguration, put: Put) -> Self {
        let entries = configuration
            .exporters
            .iter()
            .map(|e| Entry {
                subnet: e.subnet,
                exporter: e.exporter.clone(),
                default: e.default.clone(),
                interfaces: e
                    .interfaces
                    .iter()
                    .map(|i| (i.if_index, i.interface.clone()))
                    .collect(),
                skip_missing_interfaces: e.skip_missing_interfaces,
            })
            .collect();
        Self { entries, put }
    }

    /// Most specific entry containing `exporter_ip`.
    fn lookup(&self, exporter_ip: Ipv6Addr) -> Option<&Entry> {
        let mut best: Option<&Entry> = None;
        for entry in &self.entries {
            if !entry.subnet.contains(exporter_ip) {
                continue;
            }
            match best {
                Some(current) if current.subnet.rank() >= entry.subnet.rank() => {}
                _ => best = Some(entry),
            }
        }
        best
    }
}

#[async_trait]
impl Provider for StaticProvider {
    fn name(&self) -> &str {
        "static"
    }

    /// Unknown exporters, and unknown interfaces of exporters with
    /// `skip_missing_interfaces`, are handed over with
    /// [`MetadataError::SkipProvider`].
    async fn query(&self, query: &BatchQuery) -> Result<()> {
        let Some(entry) = self.lookup(query.exporter_ip) else {
            return Err(MetadataError::SkipProvider(query.if_indexes.clone()));
        };
        let mut skipped = Vec::new();
        for &if_index in &query.if_indexes {
            let interface = match entry.interfaces.get(&if_index) {
                Some(interface) => interface.clone(),
                None if entry.skip_missing_interfaces => {
                    skipped.push(if_index);
                    continue;
                }
                None => entry.default.clone(),
            };
            (self.put)(Update {
                query: Query {
                    exporter_ip: query.exporter_ip,
                    if_index,
                },
                answer: Answer {
                    exporter: entry.exporter.clone(),
                    interface,
                },
            });
        }
        if skipped.is_empty() {
            Ok(())
        } else {
            Err(MetadataError::SkipProvider(skipped))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::IpAddr;

    fn ip(s: &str) -> Ipv6Addr {
        match s.parse::<IpAddr>().unwrap() {
            IpAddr::V4(v4) => v4.to_ipv6_mapped(),
            IpAddr::V6(v6) => v6,
        }
    }

    #[test]
    fn parse_ipv4_subnet() {
        let subnet: Subnet = "192.0.2.0/24".parse().unwrap();
        assert_eq!(subnet.prefix(), 24);
        assert!(subnet.contains(ip("192.0.2.77")));
        assert!(!subnet.contains(ip("192.0.3.1")));
        assert!(!subnet.contains(ip("2001:db8::1")));
        assert_eq!(subnet.to_string(), "192.0.2.0/24");
    }

    #[test]
    fn parse_ipv6_subnet() {
        let subnet: Subnet = "2001:db8::/32".parse().unwrap();
        assert!(subnet.contains(ip("2001:db8:1::1")));
        assert!(!subnet.contains(ip("2001:db9::1")));
        assert_eq!(subnet.to_string(), "2001:db8::/32");
    }

    #[test]
    fn bare_address_is_a_host_route() {
        let subnet: Subnet = "192.0.2.1".parse().unwrap();
        assert_eq!(subnet.prefix(), 32);
        assert!(subnet.contains(ip("192.0.2.1")));
        assert!(!subnet.contains(ip("192.0.2.2")));
    }

    #[test]
    fn host_bits_are_masked() {
        let subnet: Subnet = "192.0.2.77/24".parse().unwrap();
        assert_eq!(subnet, "192.0.2.0/24".parse().unwrap());
    }

    #[test]
    fn zero_prefix_matches_everything() {
        let subnet: Subnet = "::/0".parse().unwrap();
        assert!(subnet.contains(ip("2001:db8::1")));
        assert!(subnet.contains(ip("10.0.0.1")));
    }

    #[test]
    fn ranks_compare_across_families() {
        let v4: Subnet = "10.0.0.0/8".parse().unwrap();
        let v6: Subnet = "::/64".parse().unwrap();
        assert!(v4.rank() > v6.rank());
    }

    #[test]
    fn invalid_subnets() {
        for s in ["192.0.2.0/33", "2001:db8::/129", "not an ip", "192.0.2.0/x", ""] {
            assert!(s.parse::<Subnet>().is_err(), "{s:?} should not parse");
        }
    }

    #[test]
    fn subnet_serde_uses_strings() {
        let subnet: Subnet = serde_json::from_str("\"10.0.0.0/8\"").unwrap();
        assert_eq!(serde_json::to_string(&subnet).unwrap(), "\"10.0.0.0/8\"");
    }
}
