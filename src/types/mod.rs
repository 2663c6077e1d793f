//! Public types for the flowmeta API.

mod answer;
mod query;

pub use answer::{Answer, Exporter, Interface, InterfaceBoundary};
pub use query::{BatchQuery, Query, Update};
