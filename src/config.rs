//! Runtime configuration of the metadata engine.

use std::path::PathBuf;
use std::time::Duration;

use crate::breaker::BreakerConfig;
use crate::{MetadataError, Result};

/// Configuration of a [`Metadata`](crate::Metadata) component.
///
/// ```rust
/// # use flowmeta::Configuration;
/// # use std::time::Duration;
/// let config = Configuration::new()
///     .cache_duration(Duration::from_secs(600))
///     .cache_refresh(Duration::ZERO)
///     .cache_check_interval(Duration::from_secs(60))
///     .workers(4);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Configuration {
    /// How long an entry survives without being looked up. Default: 30m.
    pub cache_duration: Duration,
    /// Age after which an entry is requested again from the provider.
    /// Zero disables refresh. Default: 1h.
    pub cache_refresh: Duration,
    /// Period of the maintenance loop. Default: 2m.
    pub cache_check_interval: Duration,
    /// Snapshot file loaded on start and written on stop.
    pub cache_persist_file: Option<PathBuf>,
    /// Number of workers querying the provider. Default: 1.
    pub workers: usize,
    /// Maximum number of interface indexes coalesced into one batch.
    /// Zero disables coalescing. Default: 10.
    pub max_batch_requests: usize,
    /// Upper bound of a single provider query. Default: 5s.
    pub query_timeout: Duration,
    /// Grace period after start during which queries may run past
    /// `query_timeout`, while providers warm up. Zero disables it.
    /// Default: 1m.
    pub initial_delay: Duration,
    /// Per-exporter breaker thresholds.
    pub breaker: BreakerConfig,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            cache_duration: Duration::from_secs(30 * 60),
            cache_refresh: Duration::from_secs(60 * 60),
            cache_check_interval: Duration::from_secs(2 * 60),
            cache_persist_file: None,
            workers: 1,
            max_batch_requests: 10,
            query_timeout: Duration::from_secs(5),
            initial_delay: Duration::from_secs(60),
            breaker: BreakerConfig::default(),
        }
    }
}

impl Configuration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cache_duration(mut self, duration: Duration) -> Self {
        self.cache_duration = duration;
        self
    }

    pub fn cache_refresh(mut self, refresh: Duration) -> Self {
        self.cache_refresh = refresh;
        self
    }

    pub fn cache_check_interval(mut self, interval: Duration) -> Self {
        self.cache_check_interval = interval;
        self
    }

    pub fn cache_persist_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.cache_persist_file = Some(path.into());
        self
    }

    pub fn workers(mut self, n: usize) -> Self {
        self.workers = n;
        self
    }

    pub fn max_batch_requests(mut self, n: usize) -> Self {
        self.max_batch_requests = n;
        self
    }

    pub fn query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = timeout;
        self
    }

    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn breaker(mut self, breaker: BreakerConfig) -> Self {
        self.breaker = breaker;
        self
    }

    /// Capacity of the dispatcher queue.
    pub fn queue_capacity(&self) -> usize {
        self.workers.saturating_mul(100)
    }

    /// Check the durations are consistent with each other.
    ///
    /// The maintenance tick must run often enough to expire entries and,
    /// when refresh is enabled, to refresh them before they expire.
    pub fn validate(&self) -> Result<()> {
        let refresh = !self.cache_refresh.is_zero();
        if refresh && self.cache_refresh < self.cache_duration {
            return Err(MetadataError::Configuration(format!(
                "cache refresh ({:?}) must be greater than cache duration ({:?})",
                self.cache_refresh, self.cache_duration
            )));
        }
        if self.cache_duration < self.cache_check_interval {
            return Err(MetadataError::Configuration(format!(
                "cache duration ({:?}) must be greater than cache check interval ({:?})",
                self.cache_duration, self.cache_check_interval
            )));
        }
        if refresh && self.cache_check_interval > self.cache_refresh {
            return Err(MetadataError::Configuration(format!(
                "cache check interval ({:?}) must be smaller than cache refresh ({:?})",
                self.cache_check_interval, self.cache_refresh
            )));
        }
        if self.cache_check_interval.is_zero() {
            return Err(MetadataError::Configuration(
                "cache check interval must not be zero".into(),
            ));
        }
        if self.workers == 0 {
            return Err(MetadataError::Configuration(
                "at least one worker is needed".into(),
            ));
        }
        if self.query_timeout.is_zero() {
            return Err(MetadataError::Configuration(
                "query timeout must not be zero".into(),
            ));
        }
        if self.breaker.error_threshold == 0 || self.breaker.success_threshold == 0 {
            return Err(MetadataError::Configuration(
                "breaker thresholds must not be zero".into(),
            ));
        }
        Ok(())
    }
}
