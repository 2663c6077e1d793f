//! Periodic cache maintenance: expiry and refresh.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::time::{Instant, MissedTickBehavior};
use tracing::debug;

use super::Inner;
use crate::telemetry;
use crate::types::Query;

/// Outcome of one maintenance run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    /// Entries dropped because nobody looked them up.
    pub expired: usize,
    /// Entries queued again for the provider.
    pub refreshed: usize,
}

fn since(now: SystemTime, age: Duration) -> SystemTime {
    now.checked_sub(age).unwrap_or(SystemTime::UNIX_EPOCH)
}

impl Inner {
    pub(crate) fn run_maintenance(&self, now: SystemTime) -> MaintenanceReport {
        let mut report = MaintenanceReport {
            expired: self.cache.expire(since(now, self.config.cache_duration)),
            refreshed: 0,
        };
        if report.expired > 0 {
            debug!(count = report.expired, "expired cache entries");
        }

        if self.config.cache_refresh.is_zero() {
            return report;
        }
        metrics::counter!(telemetry::CACHE_REFRESH_RUNS_TOTAL).increment(1);
        let plan = self
            .cache
            .need_updates(since(now, self.config.cache_refresh));
        for (exporter_ip, interfaces) in plan {
            for if_index in interfaces.into_keys() {
                if self.enqueue(Query {
                    exporter_ip,
                    if_index,
                }) {
                    report.refreshed += 1;
                }
            }
        }
        if report.refreshed > 0 {
            metrics::counter!(telemetry::CACHE_REFRESH_TOTAL).increment(report.refreshed as u64);
            debug!(count = report.refreshed, "queued cache entries for refresh");
        }
        report
    }
}

/// Maintenance task. The first run happens one period after start.
pub(crate) async fn run(inner: Arc<Inner>) {
    let period = inner.config.cache_check_interval;
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            biased;
            _ = inner.shutdown.cancelled() => break,
            _ = ticker.tick() => {
                inner.run_maintenance(inner.clock.now());
            }
        }
    }
    debug!("maintenance stopped");
}
