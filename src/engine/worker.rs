//! Provider workers.
//!
//! Each worker takes batches from the shared queue and hands them to the
//! providers through the exporter's breaker. The number of workers bounds
//! the number of provider queries in flight.
//!
//! Providers form a chain: indexes a provider returns with
//! [`MetadataError::SkipProvider`] are asked to the next one. Indexes
//! skipped by the last provider stay unanswered without counting as a
//! failure.

use std::borrow::Cow;
use std::net::Ipv6Addr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, Semaphore, mpsc};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::breaker::BreakerTable;
use crate::providers::Provider;
use crate::telemetry;
use crate::types::BatchQuery;
use crate::{MetadataError, Result};

/// How long a breaker warning is muted for a given exporter.
const BREAKER_WARNING_INTERVAL: Duration = Duration::from_secs(60);

/// Stand-in for durations too large to add to an instant.
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// Batches shared by every worker.
pub(crate) type BatchReceiver = Arc<Mutex<mpsc::Receiver<BatchQuery>>>;

/// Exporters for which a breaker warning was logged recently.
pub(crate) type WarningSampler = moka::sync::Cache<Ipv6Addr, ()>;

pub(crate) fn warning_sampler() -> WarningSampler {
    moka::sync::Cache::builder()
        .max_capacity(10_000)
        .time_to_live(BREAKER_WARNING_INTERVAL)
        .build()
}

/// `now + duration`, saturating far in the future.
pub(crate) fn deadline_after(duration: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(duration).unwrap_or(now + FAR_FUTURE)
}

pub(crate) struct Worker {
    pub(crate) id: usize,
    pub(crate) providers: Arc<[Arc<dyn Provider>]>,
    pub(crate) breakers: Arc<BreakerTable>,
    pub(crate) batches: BatchReceiver,
    /// One permit per worker waiting for a batch.
    pub(crate) idle: Arc<Semaphore>,
    pub(crate) query_timeout: Duration,
    /// Queries never time out before this instant, so providers get
    /// `initial_delay` to warm up after start.
    pub(crate) initial_deadline: Instant,
    pub(crate) warnings: WarningSampler,
    pub(crate) shutdown: CancellationToken,
}

impl Worker {
    pub(crate) async fn run(self) {
        loop {
            self.idle.add_permits(1);
            let batch = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                batch = self.next_batch() => match batch {
                    Some(batch) => batch,
                    None => break,
                },
            };
            self.handle(batch).await;
        }
        debug!(worker = self.id, "worker stopped");
    }

    async fn next_batch(&self) -> Option<BatchQuery> {
        self.batches.lock().await.recv().await
    }

    async fn handle(&self, batch: BatchQuery) {
        let breaker = self.breakers.get(batch.exporter_ip);
        let outcome = breaker.run(|| self.query(&batch)).await;
        let exporter = batch.exporter();
        match outcome {
            Ok(()) => {}
            Err(MetadataError::BreakerOpen) => {
                metrics::counter!(
                    telemetry::PROVIDER_BREAKER_OPEN_COUNT,
                    "exporter" => exporter.to_string()
                )
                .increment(1);
                if !self.warnings.contains_key(&batch.exporter_ip) {
                    self.warnings.insert(batch.exporter_ip, ());
                    warn!(exporter = %exporter, "provider breaker open");
                }
            }
            Err(MetadataError::Cancelled) => {
                debug!(exporter = %exporter, "provider query cancelled");
            }
            Err(e) => {
                metrics::counter!(telemetry::PROVIDER_ERRORS_TOTAL).increment(1);
                debug!(
                    exporter = %exporter,
                    count = batch.if_indexes.len(),
                    error = %e,
                    "provider query failed"
                );
            }
        }
    }

    async fn query(&self, batch: &BatchQuery) -> Result<()> {
        metrics::counter!(telemetry::PROVIDER_REQUESTS_TOTAL).increment(1);
        let deadline = deadline_after(self.query_timeout).max(self.initial_deadline);
        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => Err(MetadataError::Cancelled),
            outcome = tokio::time::timeout_at(deadline, self.query_chain(batch)) => {
                outcome.unwrap_or(Err(MetadataError::QueryTimeout))
            }
        }
    }

    async fn query_chain(&self, batch: &BatchQuery) -> Result<()> {
        let mut pending = Cow::Borrowed(batch);
        for provider in self.providers.iter() {
            match provider.query(&pending).await {
                Err(MetadataError::SkipProvider(skipped)) if !skipped.is_empty() => {
                    debug!(
                        exporter = %batch.exporter(),
                        provider = provider.name(),
                        count = skipped.len(),
                        "provider skipped queries"
                    );
                    pending = Cow::Owned(BatchQuery {
                        exporter_ip: batch.exporter_ip,
                        if_indexes: skipped,
                    });
                }
                Err(MetadataError::SkipProvider(_)) => return Ok(()),
                outcome => return outcome,
            }
        }
        Ok(())
    }
}
