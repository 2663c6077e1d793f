//! On-disk snapshots of a [`Store`].
//!
//! Snapshots are JSON documents tagged with a format version:
//!
//! ```json
//! { "version": 1, "entries": [ { "key": ..., "value": ..., "last_access": 0, "last_update": 0 } ] }
//! ```
//!
//! Timestamps are nanoseconds since the Unix epoch. Writes go through a
//! temporary file followed by a rename so a crash never leaves a truncated
//! snapshot behind.

use std::hash::Hash;
use std::io::ErrorKind;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::store::{Store, StoredEntry, from_nanos, to_nanos};
use crate::{MetadataError, Result};

/// Snapshot format version. Bump whenever the layout of keys, values or
/// the document itself changes.
pub const CACHE_FORMAT_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct Snapshot<K, V> {
    version: u32,
    entries: Vec<SnapshotEntry<K, V>>,
}

#[derive(Serialize, Deserialize)]
struct SnapshotEntry<K, V> {
    key: K,
    value: V,
    last_access: u64,
    last_update: u64,
}

/// Only the version, read before trusting the rest of the document.
#[derive(Deserialize)]
struct Header {
    version: u32,
}

impl<K, V> Store<K, V>
where
    K: Eq + Hash + Clone + Serialize + DeserializeOwned,
    V: Clone + Serialize + DeserializeOwned,
{
    /// Persist every entry to `path` (atomic write via tmp + rename).
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let snapshot = Snapshot {
            version: CACHE_FORMAT_VERSION,
            entries: self
                .entries()
                .into_iter()
                .map(|entry| SnapshotEntry {
                    key: entry.key,
                    value: entry.value,
                    last_access: to_nanos(entry.last_access),
                    last_update: to_nanos(entry.last_update),
                })
                .collect(),
        };
        let json = serde_json::to_vec(&snapshot)?;

        let mut tmp_name = path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp_path = Path::new(&tmp_name);
        std::fs::write(tmp_path, &json)?;
        if let Err(e) = std::fs::rename(tmp_path, path) {
            let _ = std::fs::remove_file(tmp_path);
            return Err(e.into());
        }
        Ok(())
    }

    /// Replace the content of the store with the snapshot at `path`.
    ///
    /// A missing file is [`MetadataError::CacheNotFound`], an incompatible
    /// snapshot is [`MetadataError::CacheVersion`]; the store is left
    /// untouched on any error.
    pub fn load(&self, path: &Path) -> Result<()> {
        let content = match std::fs::read(path) {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(MetadataError::CacheNotFound(path.to_path_buf()));
            }
            Err(e) => return Err(e.into()),
        };

        let header: Header = serde_json::from_slice(&content)?;
        if header.version != CACHE_FORMAT_VERSION {
            return Err(MetadataError::CacheVersion {
                found: header.version,
                expected: CACHE_FORMAT_VERSION,
            });
        }

        let snapshot: Snapshot<K, V> = serde_json::from_slice(&content)?;
        self.replace(snapshot.entries.into_iter().map(|entry| StoredEntry {
            key: entry.key,
            value: entry.value,
            last_access: from_nanos(entry.last_access),
            last_update: from_nanos(entry.last_update),
        }));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    fn t(secs: u64) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(1_700_000_000 + secs)
    }

    #[test]
    fn save_then_load_keeps_timestamps() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("cache.json");

        let store: Store<String, u32> = Store::new();
        store.put(t(0), "a".into(), 1);
        store.put(t(10), "b".into(), 2);
        store.get(t(20), &"a".to_string());
        store.save(&path).unwrap();

        let loaded: Store<String, u32> = Store::new();
        loaded.load(&path).unwrap();
        let mut got = loaded.entries();
        got.sort_by(|a, b| a.key.cmp(&b.key));
        let mut expected = store.entries();
        expected.sort_by(|a, b| a.key.cmp(&b.key));
        assert_eq!(got, expected);
    }

    #[test]
    fn save_leaves_no_temporary_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        let store: Store<String, u32> = Store::new();
        store.save(&path).unwrap();

        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("cache.json")]);
    }

    #[test]
    fn missing_file_is_not_found() {
        let store: Store<String, u32> = Store::new();
        let err = store.load(Path::new("/i/do/not/exist")).unwrap_err();
        assert!(err.is_not_found(), "unexpected error: {err}");
    }

    #[test]
    fn other_version_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        std::fs::write(&path, r#"{"version": 999, "entries": "whatever"}"#).unwrap();

        let store: Store<String, u32> = Store::new();
        store.put(t(0), "kept".into(), 1);
        let err = store.load(&path).unwrap_err();
        assert!(matches!(
            err,
            MetadataError::CacheVersion {
                found: 999,
                expected: CACHE_FORMAT_VERSION
            }
        ));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn corrupt_file_is_a_json_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        std::fs::write(&path, b"\x00not json").unwrap();

        let store: Store<String, u32> = Store::new();
        let err = store.load(&path).unwrap_err();
        assert!(matches!(err, MetadataError::Json(_)));
    }
}
