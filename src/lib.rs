//! Flowmeta - exporter and interface metadata for flow enrichment
//!
//! Flow records only carry the address of the exporting device and
//! interface indexes. This crate resolves them into names, descriptions
//! and speeds through a pluggable [`Provider`](providers::Provider), and
//! serves the answers from an in-memory cache so the flow pipeline never
//! waits on the backend.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::net::Ipv4Addr;
//! use std::sync::Arc;
//! use std::time::SystemTime;
//! use flowmeta::{Configuration, Metadata, providers::ProviderRegistry};
//!
//! #[tokio::main]
//! async fn main() -> flowmeta::Result<()> {
//!     let provider = ProviderRegistry::with_builtin().configuration(
//!         "static",
//!         serde_json::json!({
//!             "exporters": [{
//!                 "subnet": "192.0.2.0/24",
//!                 "name": "edge1",
//!                 "default": { "name": "unknown" }
//!             }]
//!         }),
//!     )?;
//!     let metadata = Metadata::builder(Configuration::default())
//!         .provider(provider)
//!         .build()?;
//!     metadata.start()?;
//!
//!     // First lookup misses and queues the query.
//!     let exporter = Ipv4Addr::new(192, 0, 2, 1);
//!     assert!(metadata.lookup(SystemTime::now(), exporter, 10).is_none());
//!
//!     metadata.stop().await;
//!     Ok(())
//! }
//! ```

pub mod breaker;
pub mod cache;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod providers;
pub mod settings;
pub mod telemetry;
pub mod types;
pub mod version;

// Re-export main types at crate root
pub use breaker::{BreakerConfig, BreakerState};
pub use cache::MetadataCache;
pub use clock::{Clock, MockClock, SystemClock};
pub use config::Configuration;
pub use engine::{MaintenanceReport, Metadata, MetadataBuilder};
pub use error::{MetadataError, Result};
pub use settings::Settings;
pub use types::{Answer, BatchQuery, Exporter, Interface, InterfaceBoundary, Query, Update};
pub use version::{PKG_VERSION, version_string};
