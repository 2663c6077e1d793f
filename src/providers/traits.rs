//! Provider contract.
//!
//! A provider resolves interface metadata for batches of queries against
//! one backend (static table, SNMP, gNMI, OVSDB, ...). The engine is
//! agnostic to which one it talks to: it only calls [`Provider::query`]
//! and receives results through the [`Put`] callback handed over when the
//! provider was built.
//!
//! # Synchronous and asynchronous resolution
//!
//! `query` may call `put` before returning (a table lookup, an SNMP poll)
//! or arrange for it to be called later from a background task (a
//! streaming telemetry collector). Both are valid; the engine never waits
//! for the answers themselves, only for `query` to return.
//!
//! # Errors
//!
//! An error returned by `query` is counted against the exporter's breaker.
//! Providers should only fail when the backend itself failed. Unknown
//! exporters or interfaces are reported through `put` (possibly with an
//! empty [`Answer`](crate::types::Answer)), or handed to the next provider
//! of the chain by returning [`MetadataError::SkipProvider`] with the
//! indexes left unanswered. Skipping is not a failure.
//!
//! [`MetadataError::SkipProvider`]: crate::MetadataError::SkipProvider
//!
//! # Example
//!
//! ```ignore
//! struct Echo { put: Put }
//!
//! #[async_trait]
//! impl Provider for Echo {
//!     fn name(&self) -> &str { "echo" }
//!
//!     async fn query(&self, query: &BatchQuery) -> Result<()> {
//!         for q in query.queries() {
//!             (self.put)(Update { query: q, answer: Answer::new(q.to_string(), Interface::default()) });
//!         }
//!         Ok(())
//!     }
//! }
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::Result;
use crate::types::{BatchQuery, Update};

/// Callback storing a provider answer into the cache.
///
/// Safe to call from any task, at any time, including after the `query`
/// that triggered it returned.
pub type Put = Arc<dyn Fn(Update) + Send + Sync>;

/// Backend resolving exporter and interface metadata.
///
/// Implementations must be safe to call concurrently from several workers.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Provider name for logging/debugging.
    fn name(&self) -> &str;

    /// Resolve every index of `query`, reporting answers through `put`.
    ///
    /// The engine bounds the call with its query timeout and drops the
    /// future on shutdown.
    async fn query(&self, query: &BatchQuery) -> Result<()>;
}

/// What a provider receives when it is built.
#[derive(Clone)]
pub struct ProviderContext {
    /// Where answers go.
    pub put: Put,
    /// Fires when the engine stops. Background tasks owned by the provider
    /// must exit once it is cancelled.
    pub shutdown: CancellationToken,
}

/// Configuration able to instantiate a provider.
pub trait ProviderConfiguration: Send + Sync {
    /// Provider name, as registered in the [`ProviderRegistry`](super::ProviderRegistry).
    fn name(&self) -> &str;

    /// Instantiate the provider.
    fn build(&self, ctx: ProviderContext) -> Result<Arc<dyn Provider>>;
}
