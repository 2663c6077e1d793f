//! Builder for metadata components

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{Inner, Metadata, State};
use crate::breaker::BreakerTable;
use crate::cache::MetadataCache;
use crate::clock::{Clock, SystemClock};
use crate::config::Configuration;
use crate::providers::{ProviderConfiguration, ProviderContext, Put};
use crate::types::Update;
use crate::{MetadataError, Result};

/// Builder for configuring a [`Metadata`] component.
pub struct MetadataBuilder {
    configuration: Configuration,
    providers: Vec<Arc<dyn ProviderConfiguration>>,
    clock: Arc<dyn Clock>,
}

impl MetadataBuilder {
    pub fn new(configuration: Configuration) -> Self {
        Self {
            configuration,
            providers: Vec::new(),
            clock: Arc::new(SystemClock),
        }
    }

    /// Append a provider to the chain. At least one is required.
    ///
    /// Providers are asked in the order they were added; the next one only
    /// sees the queries the previous ones skipped.
    pub fn provider(mut self, provider: Arc<dyn ProviderConfiguration>) -> Self {
        self.providers.push(provider);
        self
    }

    /// Append several providers to the chain.
    pub fn providers(
        mut self,
        providers: impl IntoIterator<Item = Arc<dyn ProviderConfiguration>>,
    ) -> Self {
        self.providers.extend(providers);
        self
    }

    /// Clock used to timestamp provider answers (default: system clock).
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Validate the configuration and instantiate the providers.
    ///
    /// The returned component is not started.
    pub fn build(self) -> Result<Metadata> {
        self.configuration.validate()?;
        if self.providers.is_empty() {
            return Err(MetadataError::Configuration(
                "no provider configured".to_string(),
            ));
        }

        let cache = Arc::new(MetadataCache::new());
        let shutdown = CancellationToken::new();
        let put: Put = {
            let cache = Arc::clone(&cache);
            let clock = Arc::clone(&self.clock);
            Arc::new(move |update: Update| cache.put(clock.now(), update.query, update.answer))
        };
        let providers = self
            .providers
            .iter()
            .map(|configuration| {
                configuration.build(ProviderContext {
                    put: Arc::clone(&put),
                    shutdown: shutdown.clone(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let (requests_tx, requests_rx) = mpsc::channel(self.configuration.queue_capacity());
        let breakers = Arc::new(BreakerTable::new(self.configuration.breaker.clone()));
        Ok(Metadata {
            provider_names: providers.iter().map(|p| p.name().to_string()).collect(),
            inner: Arc::new(Inner {
                config: self.configuration,
                cache,
                clock: self.clock,
                breakers,
                requests: requests_tx,
                shutdown,
            }),
            state: Mutex::new(State::Ready {
                requests: requests_rx,
                providers,
            }),
        })
    }
}
