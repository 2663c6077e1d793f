//! Provider contract, registry and built-in providers.
//!
//! - [`traits`]: the [`Provider`] and [`ProviderConfiguration`] traits every
//!   backend implements.
//! - [`registry`]: maps provider names to factories turning configuration
//!   parameters into a [`ProviderConfiguration`].
//! - [`static_table`]: answers from a configured table of exporters.

pub mod registry;
pub mod static_table;
pub mod traits;

pub use registry::{ProviderFactory, ProviderRegistry};
pub use static_table::{StaticConfiguration, StaticExporter, StaticProvider, Subnet};
pub use traits::{Provider, ProviderConfiguration, ProviderContext, Put};
