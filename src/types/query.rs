//! Lookup keys exchanged between the engine and providers

use std::fmt;
use std::net::{IpAddr, Ipv6Addr};

use serde::{Deserialize, Serialize};

use super::Answer;

/// One interface on one exporter.
///
/// The exporter address is always stored as IPv6; IPv4 exporters are kept
/// in their IPv4-mapped form (`::ffff:a.b.c.d`) so a given device has a
/// single key whichever way its address was parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Query {
    pub exporter_ip: Ipv6Addr,
    pub if_index: u32,
}

impl Query {
    /// Build a query, mapping IPv4 exporters into the IPv6 space.
    pub fn new(exporter_ip: impl Into<IpAddr>, if_index: u32) -> Self {
        Self {
            exporter_ip: canonical_ip(exporter_ip.into()),
            if_index,
        }
    }

    /// Exporter address as it should be shown to humans (IPv4 unmapped).
    pub fn exporter(&self) -> IpAddr {
        self.exporter_ip.to_canonical()
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.exporter(), self.if_index)
    }
}

/// Several interface indexes of the same exporter, resolved together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchQuery {
    pub exporter_ip: Ipv6Addr,
    /// Indexes in submission order.
    pub if_indexes: Vec<u32>,
}

impl BatchQuery {
    pub fn new(exporter_ip: impl Into<IpAddr>, if_indexes: Vec<u32>) -> Self {
        Self {
            exporter_ip: canonical_ip(exporter_ip.into()),
            if_indexes,
        }
    }

    /// Exporter address as it should be shown to humans (IPv4 unmapped).
    pub fn exporter(&self) -> IpAddr {
        self.exporter_ip.to_canonical()
    }

    /// Individual queries covered by this batch.
    pub fn queries(&self) -> impl Iterator<Item = Query> + '_ {
        self.if_indexes.iter().map(|&if_index| Query {
            exporter_ip: self.exporter_ip,
            if_index,
        })
    }
}

/// A resolved (or deliberately empty) answer reported by a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Update {
    pub query: Query,
    pub answer: Answer,
}

fn canonical_ip(ip: IpAddr) -> Ipv6Addr {
    match ip {
        IpAddr::V4(v4) => v4.to_ipv6_mapped(),
        IpAddr::V6(v6) => v6,
    }
}
