//! Metadata cache.
//!
//! [`MetadataCache`] maps a [`Query`] to the [`Answer`] last reported by a
//! provider. Two independent clocks drive its policies:
//!
//! - `last_access`, bumped by every hit and every put, decides **expiry**:
//!   entries nobody asked about for a while are dropped by
//!   [`MetadataCache::expire`].
//! - `last_update`, bumped only by puts, decides **refresh**:
//!   [`MetadataCache::need_updates`] lists entries whose data is getting old
//!   even though they are still being read.
//!
//! The generic machinery lives in [`store`]; snapshot encoding lives in
//! [`persist`].

pub mod persist;
pub mod store;

pub use persist::CACHE_FORMAT_VERSION;
pub use store::{Store, StoredEntry};

use std::collections::BTreeMap;
use std::net::Ipv6Addr;
use std::path::Path;
use std::time::SystemTime;

use metrics::{Counter, Gauge};

use crate::Result;
use crate::telemetry;
use crate::types::{Answer, Interface, Query};

/// Entries due for refresh, grouped by exporter then interface index.
pub type RefreshPlan = BTreeMap<Ipv6Addr, BTreeMap<u32, Interface>>;

/// Thread-safe cache of provider answers.
///
/// Metric handles are registered once at construction, against whichever
/// `metrics` recorder is active at that time.
pub struct MetadataCache {
    store: Store<Query, Answer>,
    hits: Counter,
    misses: Counter,
    expired: Counter,
    size: Gauge,
}

impl MetadataCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        let cache = Self {
            store: Store::new(),
            hits: metrics::counter!(telemetry::CACHE_HITS_TOTAL),
            misses: metrics::counter!(telemetry::CACHE_MISSES_TOTAL),
            expired: metrics::counter!(telemetry::CACHE_EXPIRED_ENTRIES_TOTAL),
            size: metrics::gauge!(telemetry::CACHE_SIZE_ENTRIES),
        };
        cache.size.set(0.0);
        cache
    }

    /// Look a query up, marking it as accessed at `now`.
    ///
    /// Returns `None` on miss; a miss never creates an entry.
    pub fn lookup(&self, now: SystemTime, query: &Query) -> Option<Answer> {
        match self.store.get(now, query) {
            Some(answer) => {
                self.hits.increment(1);
                Some(answer)
            }
            None => {
                self.misses.increment(1);
                None
            }
        }
    }

    /// Insert or replace the answer for `query`. Last writer wins.
    pub fn put(&self, now: SystemTime, query: Query, answer: Answer) {
        self.store.put(now, query, answer);
        self.size.set(self.store.len() as f64);
    }

    /// Drop entries not accessed since `before`. Returns how many went away.
    pub fn expire(&self, before: SystemTime) -> usize {
        let expired = self.store.delete_accessed_before(before);
        self.expired.increment(expired as u64);
        self.size.set(self.store.len() as f64);
        expired
    }

    /// Entries last updated before `before`, grouped by exporter.
    ///
    /// Does not modify the cache, nor the access time of the entries.
    pub fn need_updates(&self, before: SystemTime) -> RefreshPlan {
        let mut plan = RefreshPlan::new();
        for (query, answer) in self.store.updated_before(before) {
            plan.entry(query.exporter_ip)
                .or_default()
                .insert(query.if_index, answer.interface);
        }
        plan
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.store.len()
    }

    /// Whether the cache holds no entry.
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Every entry with its timestamps.
    pub fn entries(&self) -> Vec<StoredEntry<Query, Answer>> {
        self.store.entries()
    }

    /// Persist the cache to `path`.
    pub fn save(&self, path: &Path) -> Result<()> {
        self.store.save(path)
    }

    /// Replace the cache content with the snapshot stored at `path`.
    pub fn load(&self, path: &Path) -> Result<()> {
        self.store.load(path)?;
        self.size.set(self.store.len() as f64);
        Ok(())
    }
}

impl Default for MetadataCache {
    fn default() -> Self {
        Self::new()
    }
}
