//! Lookup engine.
//!
//! [`Metadata`] ties the pieces together:
//!
//! ```text
//! lookup ──hit──► Answer
//!    │ miss
//!    ▼
//! request queue ──► dispatcher ──batches──► workers ──breaker──► Providers
//!    ▲                   ▲                     │                      │
//!    │ refresh           └──────idle───────────┘               put(Update)
//! maintenance ──expire──► cache ◄─────────────────────────────────────┘
//! ```
//!
//! [`Metadata::lookup`] never waits: a miss is queued (or dropped when the
//! queue is full) and answered later, once the provider reported it.

mod builder;
mod dispatcher;
mod maintenance;
mod worker;

pub use builder::MetadataBuilder;
pub use maintenance::MaintenanceReport;

use std::mem;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::SystemTime;

use futures_util::future::join_all;
use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::breaker::{BreakerState, BreakerTable};
use crate::cache::MetadataCache;
use crate::clock::Clock;
use crate::config::Configuration;
use crate::providers::Provider;
use crate::telemetry;
use crate::types::{Answer, Query};
use crate::{MetadataError, Result};

use worker::Worker;

/// State shared by the engine handle and its tasks.
pub(crate) struct Inner {
    pub(crate) config: Configuration,
    pub(crate) cache: Arc<MetadataCache>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) breakers: Arc<BreakerTable>,
    pub(crate) requests: mpsc::Sender<Query>,
    pub(crate) shutdown: CancellationToken,
}

impl Inner {
    /// Queue a request without waiting. Returns whether it was accepted.
    pub(crate) fn enqueue(&self, query: Query) -> bool {
        match self.requests.try_send(query) {
            Ok(()) => true,
            Err(TrySendError::Full(query)) => {
                metrics::counter!(
                    telemetry::PROVIDER_BUSY_COUNT,
                    "exporter" => query.exporter().to_string()
                )
                .increment(1);
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }
}

enum State {
    Ready {
        requests: mpsc::Receiver<Query>,
        providers: Vec<Arc<dyn Provider>>,
    },
    Running(Vec<JoinHandle<()>>),
    Stopped,
}

/// Metadata component: cache, dispatcher, workers and maintenance.
///
/// ```rust,no_run
/// use std::net::Ipv4Addr;
/// use std::sync::Arc;
/// use std::time::SystemTime;
/// use flowmeta::{Configuration, Metadata, providers::StaticConfiguration};
///
/// # async fn example() -> flowmeta::Result<()> {
/// let metadata = Metadata::builder(Configuration::default())
///     .provider(Arc::new(StaticConfiguration::default()))
///     .build()?;
/// metadata.start()?;
/// if let Some(answer) = metadata.lookup(SystemTime::now(), Ipv4Addr::new(192, 0, 2, 1), 10) {
///     println!("{} {}", answer.exporter.name, answer.interface.name);
/// }
/// metadata.stop().await;
/// # Ok(())
/// # }
/// ```
pub struct Metadata {
    inner: Arc<Inner>,
    provider_names: Vec<String>,
    state: Mutex<State>,
}

impl Metadata {
    /// Start configuring a component.
    pub fn builder(configuration: Configuration) -> MetadataBuilder {
        MetadataBuilder::new(configuration)
    }

    /// Load the persisted cache and spawn the background tasks.
    ///
    /// Must be called from within a tokio runtime. A component can only be
    /// started once.
    pub fn start(&self) -> Result<()> {
        let mut state = self.state.lock();
        let (requests, providers) = match mem::replace(&mut *state, State::Stopped) {
            State::Ready {
                requests,
                providers,
            } => (requests, providers),
            running @ State::Running(_) => {
                *state = running;
                return Err(MetadataError::InvalidState("already started"));
            }
            State::Stopped => return Err(MetadataError::InvalidState("already stopped")),
        };

        self.load_cache();

        let inner = &self.inner;
        let workers = inner.config.workers;
        // Pending work waits in the request queue, where it can still be
        // coalesced, until a worker is idle.
        let (batches_tx, batches_rx) = mpsc::channel(workers);
        let batches_rx = Arc::new(tokio::sync::Mutex::new(batches_rx));
        let idle = Arc::new(Semaphore::new(0));
        let providers: Arc<[Arc<dyn Provider>]> = providers.into();
        let initial_deadline = worker::deadline_after(inner.config.initial_delay);
        let warnings = worker::warning_sampler();

        let mut handles = Vec::with_capacity(workers + 2);
        handles.push(tokio::spawn(dispatcher::run(
            requests,
            batches_tx,
            Arc::clone(&idle),
            inner.config.max_batch_requests,
            inner.shutdown.clone(),
        )));
        for id in 0..workers {
            let worker = Worker {
                id,
                providers: Arc::clone(&providers),
                breakers: Arc::clone(&inner.breakers),
                batches: Arc::clone(&batches_rx),
                idle: Arc::clone(&idle),
                query_timeout: inner.config.query_timeout,
                initial_deadline,
                warnings: warnings.clone(),
                shutdown: inner.shutdown.clone(),
            };
            handles.push(tokio::spawn(worker.run()));
        }
        handles.push(tokio::spawn(maintenance::run(Arc::clone(inner))));

        info!(
            providers = ?self.provider_names,
            workers,
            entries = inner.cache.len(),
            "metadata component started"
        );
        *state = State::Running(handles);
        Ok(())
    }

    /// Stop the background tasks, then persist the cache.
    ///
    /// Provider queries in flight are cancelled. Stopping a component that
    /// was never started only shuts it down.
    pub async fn stop(&self) {
        let previous = mem::replace(&mut *self.state.lock(), State::Stopped);
        self.inner.shutdown.cancel();
        let State::Running(handles) = previous else {
            return;
        };
        for outcome in join_all(handles).await {
            if let Err(e) = outcome {
                warn!(error = %e, "metadata task failed");
            }
        }
        self.save_cache();
        info!("metadata component stopped");
    }

    /// Look up an interface.
    ///
    /// On a hit the cached answer is returned. On a miss `None` is returned
    /// right away and the query is handed to the provider in the
    /// background; a later lookup will find the answer.
    pub fn lookup(
        &self,
        now: SystemTime,
        exporter_ip: impl Into<IpAddr>,
        if_index: u32,
    ) -> Option<Answer> {
        let query = Query::new(exporter_ip, if_index);
        if let Some(answer) = self.inner.cache.lookup(now, &query) {
            return Some(answer);
        }
        self.inner.enqueue(query);
        None
    }

    /// Expire old entries and queue the ones due for refresh.
    ///
    /// Called by the maintenance task every `cache_check_interval`.
    pub fn run_maintenance(&self, now: SystemTime) -> MaintenanceReport {
        self.inner.run_maintenance(now)
    }

    /// The underlying cache.
    pub fn cache(&self) -> &MetadataCache {
        &self.inner.cache
    }

    /// Effective configuration.
    pub fn configuration(&self) -> &Configuration {
        &self.inner.config
    }

    /// Names of the providers answering queries, in the order they are
    /// asked.
    pub fn provider_names(&self) -> &[String] {
        &self.provider_names
    }

    /// State of the breaker of `exporter_ip`, if it was ever queried.
    pub fn breaker_state(&self, exporter_ip: impl Into<IpAddr>) -> Option<BreakerState> {
        let query = Query::new(exporter_ip, 0);
        self.inner
            .breakers
            .find(query.exporter_ip)
            .map(|breaker| breaker.state())
    }

    fn load_cache(&self) {
        let Some(path) = &self.inner.config.cache_persist_file else {
            return;
        };
        match self.inner.cache.load(path) {
            Ok(()) => info!(
                path = %path.display(),
                entries = self.inner.cache.len(),
                "cache loaded"
            ),
            Err(e) if e.is_not_found() => {
                debug!(path = %path.display(), "no cache to load");
            }
            Err(e) => warn!(path = %path.display(), error = %e, "unable to load cache"),
        }
    }

    fn save_cache(&self) {
        let Some(path) = &self.inner.config.cache_persist_file else {
            return;
        };
        match self.inner.cache.save(path) {
            Ok(()) => debug!(
                path = %path.display(),
                entries = self.inner.cache.len(),
                "cache saved"
            ),
            Err(e) => warn!(path = %path.display(), error = %e, "unable to save cache"),
        }
    }
}

impl Drop for Metadata {
    fn drop(&mut self) {
        self.inner.shutdown.cancel();
    }
}
