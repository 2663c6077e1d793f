//! Generic key/value store tracking two clocks per entry.
//!
//! Every entry remembers when it was last read (`last_access`) and when it
//! was last written (`last_update`). Callers supply the current time on each
//! operation; the store never reads the wall clock, which keeps expiry and
//! refresh decisions deterministic.
//!
//! Reads bump `last_access` through an atomic while holding only the read
//! lock, so concurrent lookups never serialize on each other.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use parking_lot::RwLock;

/// Stored value with its two timestamps (nanoseconds since the Unix epoch).
#[derive(Debug)]
struct Item<V> {
    value: V,
    last_access: AtomicU64,
    last_update: u64,
}

/// Entry as seen from outside the store, used for snapshots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredEntry<K, V> {
    pub key: K,
    pub value: V,
    pub last_access: SystemTime,
    pub last_update: SystemTime,
}

/// Thread-safe in-memory key/value store.
#[derive(Debug)]
pub struct Store<K, V> {
    items: RwLock<HashMap<K, Item<V>>>,
}

impl<K, V> Default for Store<K, V> {
    fn default() -> Self {
        Self {
            items: RwLock::new(HashMap::new()),
        }
    }
}

impl<K, V> Store<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or fully replace the value for `key`, setting both clocks to `now`.
    pub fn put(&self, now: SystemTime, key: K, value: V) {
        let n = to_nanos(now);
        let item = Item {
            value,
            last_access: AtomicU64::new(n),
            last_update: n,
        };
        self.items.write().insert(key, item);
    }

    /// Fetch a value and mark it as accessed at `now`.
    ///
    /// Never creates an entry. The access time only moves forward, so
    /// concurrent lookups carrying slightly older timestamps cannot make an
    /// entry look idle.
    pub fn get(&self, now: SystemTime, key: &K) -> Option<V> {
        let items = self.items.read();
        let item = items.get(key)?;
        item.last_access.fetch_max(to_nanos(now), Ordering::Relaxed);
        Some(item.value.clone())
    }

    /// Remove every entry whose last access is strictly before `before`.
    ///
    /// Returns the number of removed entries.
    pub fn delete_accessed_before(&self, before: SystemTime) -> usize {
        let threshold = to_nanos(before);
        let mut items = self.items.write();
        let previous = items.len();
        items.retain(|_, item| item.last_access.load(Ordering::Relaxed) >= threshold);
        previous - items.len()
    }

    /// Entries whose last update is strictly before `before`. Read-only.
    pub fn updated_before(&self, before: SystemTime) -> Vec<(K, V)> {
        let threshold = to_nanos(before);
        self.items
            .read()
            .iter()
            .filter(|(_, item)| item.last_update < threshold)
            .map(|(k, item)| (k.clone(), item.value.clone()))
            .collect()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of every entry with both timestamps.
    pub fn entries(&self) -> Vec<StoredEntry<K, V>> {
        self.items
            .read()
            .iter()
            .map(|(k, item)| StoredEntry {
                key: k.clone(),
                value: item.value.clone(),
                last_access: from_nanos(item.last_access.load(Ordering::Relaxed)),
                last_update: from_nanos(item.last_update),
            })
            .collect()
    }

    /// Replace the whole content of the store.
    pub fn replace(&self, entries: impl IntoIterator<Item = StoredEntry<K, V>>) {
        let items: HashMap<K, Item<V>> = entries
            .into_iter()
            .map(|entry| {
                let item = Item {
                    value: entry.value,
                    last_access: AtomicU64::new(to_nanos(entry.last_access)),
                    last_update: to_nanos(entry.last_update),
                };
                (entry.key, item)
            })
            .collect();
        *self.items.write() = items;
    }
}

/// Nanoseconds since the Unix epoch, saturating at both ends.
pub(crate) fn to_nanos(t: SystemTime) -> u64 {
    t.duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

pub(crate) fn from_nanos(n: u64) -> SystemTime {
    UNIX_EPOCH + Duration::from_nanos(n)
}
