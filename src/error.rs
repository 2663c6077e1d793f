//! Flowmeta error types

use std::path::PathBuf;

/// Flowmeta error types
#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    // Configuration errors
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("unknown provider: {0}")]
    UnknownProvider(String),

    #[error("invalid state: {0}")]
    InvalidState(&'static str),

    // Provider errors
    #[error("provider error: {0}")]
    Provider(String),

    /// The provider leaves these interface indexes to the next provider.
    #[error("provider skipped {} queries", .0.len())]
    SkipProvider(Vec<u32>),

    #[error("provider query timeout")]
    QueryTimeout,

    #[error("query cancelled by shutdown")]
    Cancelled,

    /// The exporter's breaker rejected the call without reaching the provider.
    #[error("provider breaker open")]
    BreakerOpen,

    // Persistence errors
    #[error("cache file not found: {}", .0.display())]
    CacheNotFound(PathBuf),

    #[error("cache version mismatch (found {found}, expected {expected})")]
    CacheVersion { found: u32, expected: u32 },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl MetadataError {
    /// Whether this error means a persisted cache simply does not exist yet.
    ///
    /// Hosts treat this as a cold start rather than a failure.
    pub fn is_not_found(&self) -> bool {
        matches!(self, MetadataError::CacheNotFound(_))
    }
}

/// Result type alias for flowmeta operations
pub type Result<T> = std::result::Result<T, MetadataError>;
