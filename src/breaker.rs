//! Per-exporter circuit breaker.
//!
//! Unreachable exporters (an SNMP agent behind a broken ACL, a device
//! being rebooted) would otherwise receive a provider call for every flow
//! carrying one of their interfaces. A [`Breaker`] sits in front of each
//! exporter and stops those calls once they keep failing.
//!
//! ```text
//!            error_threshold failures
//!   Closed ───────────────────────────► Open { until }
//!     ▲                                  │ timeout elapsed
//!     │ success_threshold successes      ▼
//!     └──────────────────────────────  HalfOpen ── trial fails ──► Open
//! ```
//!
//! While open, calls are rejected with [`MetadataError::BreakerOpen`]
//! without running. In half-open state a single trial runs at a time and
//! concurrent calls are rejected.

use std::collections::HashMap;
use std::future::Future;
use std::net::Ipv6Addr;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use crate::{MetadataError, Result};

/// Thresholds and cool-down of a breaker.
///
/// ```rust
/// # use flowmeta::BreakerConfig;
/// # use std::time::Duration;
/// let config = BreakerConfig::new()
///     .error_threshold(5)
///     .timeout(Duration::from_secs(30));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakerConfig {
    /// Failures needed to open the breaker. Default: 20.
    pub error_threshold: u32,
    /// Successful trials needed to close a half-open breaker. Default: 1.
    pub success_threshold: u32,
    /// How long the breaker stays open, and how long a failure is
    /// remembered while closed. Default: 60s.
    pub timeout: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            error_threshold: 20,
            success_threshold: 1,
            timeout: Duration::from_secs(60),
        }
    }
}

impl BreakerConfig {
    /// Create a new config with the default thresholds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of failures opening the breaker.
    pub fn error_threshold(mut self, n: u32) -> Self {
        self.error_threshold = n;
        self
    }

    /// Set the number of successful trials closing the breaker.
    pub fn success_threshold(mut self, n: u32) -> Self {
        self.success_threshold = n;
        self
    }

    /// Set the cool-down duration.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Observable state of a breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
enum Status {
    Closed {
        failures: u32,
        last_failure: Option<Instant>,
    },
    Open {
        until: Instant,
    },
    HalfOpen {
        successes: u32,
        trial_running: bool,
    },
}

/// Circuit breaker guarding calls to one exporter.
#[derive(Debug)]
pub struct Breaker {
    config: BreakerConfig,
    status: Mutex<Status>,
}

impl Breaker {
    /// Create a closed breaker.
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            status: Mutex::new(Status::Closed {
                failures: 0,
                last_failure: None,
            }),
        }
    }

    /// Current state. An open breaker whose cool-down elapsed reports
    /// [`BreakerState::HalfOpen`].
    pub fn state(&self) -> BreakerState {
        match *self.status.lock() {
            Status::Closed { .. } => BreakerState::Closed,
            Status::Open { until } if Instant::now() < until => BreakerState::Open,
            Status::Open { .. } | Status::HalfOpen { .. } => BreakerState::HalfOpen,
        }
    }

    /// Run `f` if the breaker lets it through, and feed its outcome back.
    ///
    /// Returns [`MetadataError::BreakerOpen`] without calling `f` when the
    /// breaker rejects the call. A half-open trial dropped before it
    /// completes reopens the breaker.
    pub async fn run<F, Fut, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let call = self.admit()?;
        let outcome = f().await;
        call.finish(outcome.is_ok());
        outcome
    }

    fn admit(&self) -> Result<Call<'_>> {
        let mut status = self.status.lock();
        let trial = match *status {
            Status::Closed { .. } => false,
            Status::Open { until } => {
                if Instant::now() < until {
                    return Err(MetadataError::BreakerOpen);
                }
                *status = Status::HalfOpen {
                    successes: 0,
                    trial_running: true,
                };
                true
            }
            Status::HalfOpen {
                ref mut trial_running,
                ..
            } => {
                if *trial_running {
                    return Err(MetadataError::BreakerOpen);
                }
                *trial_running = true;
                true
            }
        };
        Ok(Call {
            breaker: self,
            trial,
            finished: false,
        })
    }

    /// The half-open trial was dropped before completing.
    fn abandon(&self) {
        let mut status = self.status.lock();
        if matches!(*status, Status::HalfOpen { .. }) {
            *status = Status::Open {
                until: Instant::now() + self.config.timeout,
            };
        }
    }

    fn record(&self, success: bool) {
        let now = Instant::now();
        let mut status = self.status.lock();
        match *status {
            Status::Closed {
                ref mut failures,
                ref mut last_failure,
            } => {
                if success {
                    *failures = 0;
                    *last_failure = None;
                    return;
                }
                if last_failure.is_some_and(|last| now.duration_since(last) > self.config.timeout) {
                    *failures = 0;
                }
                *failures += 1;
                *last_failure = Some(now);
                if *failures >= self.config.error_threshold {
                    *status = Status::Open {
                        until: now + self.config.timeout,
                    };
                }
            }
            Status::HalfOpen { successes, .. } => {
                if !success {
                    *status = Status::Open {
                        until: now + self.config.timeout,
                    };
                } else if successes + 1 >= self.config.success_threshold {
                    *status = Status::Closed {
                        failures: 0,
                        last_failure: None,
                    };
                } else {
                    *status = Status::HalfOpen {
                        successes: successes + 1,
                        trial_running: false,
                    };
                }
            }
            // A call admitted before another one opened the breaker.
            Status::Open { .. } => {}
        }
    }
}

/// An admitted call. A half-open trial dropped without an outcome reopens
/// the breaker; other dropped calls are not counted.
struct Call<'a> {
    breaker: &'a Breaker,
    trial: bool,
    finished: bool,
}

impl Call<'_> {
    fn finish(mut self, success: bool) {
        self.finished = true;
        self.breaker.record(success);
    }
}

impl Drop for Call<'_> {
    fn drop(&mut self) {
        if self.trial && !self.finished {
            self.breaker.abandon();
        }
    }
}

/// Lazily created breakers, one per exporter.
///
/// Entries are never removed; the table is bounded by the number of
/// distinct exporters.
#[derive(Debug)]
pub struct BreakerTable {
    config: BreakerConfig,
    breakers: Mutex<HashMap<Ipv6Addr, Arc<Breaker>>>,
}

impl BreakerTable {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            breakers: Mutex::new(HashMap::new()),
        }
    }

    /// Breaker of `exporter`, created closed on first use.
    pub fn get(&self, exporter: Ipv6Addr) -> Arc<Breaker> {
        let mut breakers = self.breakers.lock();
        Arc::clone(
            breakers
                .entry(exporter)
                .or_insert_with(|| Arc::new(Breaker::new(self.config.clone()))),
        )
    }

    /// Breaker of `exporter`, if one was created.
    pub fn find(&self, exporter: Ipv6Addr) -> Option<Arc<Breaker>> {
        self.breakers.lock().get(&exporter).cloned()
    }

    /// Number of exporters with a breaker.
    pub fn len(&self) -> usize {
        self.breakers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
