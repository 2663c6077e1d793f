//! Tests for [`MetadataCache`]: two-clock expiry/refresh and snapshots.

use std::collections::BTreeMap;
use std::net::Ipv6Addr;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, SystemTime};

use metrics_util::MetricKind;
use metrics_util::debugging::{DebugValue, DebuggingRecorder};
use proptest::prelude::*;

use flowmeta::cache::CACHE_FORMAT_VERSION;
use flowmeta::telemetry;
use flowmeta::{Answer, Interface, MetadataCache, MetadataError, Query};

type SnapshotVec = Vec<(
    metrics_util::CompositeKey,
    Option<metrics::Unit>,
    Option<metrics::SharedString>,
    DebugValue,
)>;

/// Run `f` against a cache created under a local recorder.
fn with_metrics(f: impl FnOnce(&MetadataCache)) -> SnapshotVec {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    metrics::with_local_recorder(&recorder, || f(&MetadataCache::new()));
    snapshotter.snapshot().into_vec()
}

fn counter(snapshot: &SnapshotVec, name: &str) -> u64 {
    snapshot
        .iter()
        .filter(|(key, _, _, _)| key.kind() == MetricKind::Counter && key.key().name() == name)
        .map(|(_, _, _, value)| match value {
            DebugValue::Counter(v) => *v,
            _ => 0,
        })
        .sum()
}

fn gauge(snapshot: &SnapshotVec, name: &str) -> f64 {
    snapshot
        .iter()
        .find(|(key, _, _, _)| key.kind() == MetricKind::Gauge && key.key().name() == name)
        .map(|(_, _, _, value)| match value {
            DebugValue::Gauge(v) => v.0,
            _ => 0.0,
        })
        .unwrap_or(0.0)
}

fn t0() -> SystemTime {
    SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000)
}

fn minutes(n: u64) -> Duration {
    Duration::from_secs(n * 60)
}

fn q(exporter: &str, if_index: u32) -> Query {
    Query::new(exporter.parse::<std::net::IpAddr>().unwrap(), if_index)
}

fn answer(exporter: &str, name: &str, description: &str) -> Answer {
    Answer::new(exporter, Interface::new(name, description, 0))
}

#[test]
fn get_empty() {
    let snapshot = with_metrics(|cache| {
        assert_eq!(cache.lookup(t0(), &q("127.0.0.1", 676)), None);
    });
    assert_eq!(counter(&snapshot, telemetry::CACHE_HITS_TOTAL), 0);
    assert_eq!(counter(&snapshot, telemetry::CACHE_MISSES_TOTAL), 1);
    assert_eq!(counter(&snapshot, telemetry::CACHE_EXPIRED_ENTRIES_TOTAL), 0);
    assert_eq!(gauge(&snapshot, telemetry::CACHE_SIZE_ENTRIES), 0.0);
}

#[test]
fn simple_lookup() {
    let expected = Answer::new("localhost", Interface::new("Gi0/0/0/1", "Transit", 1000));
    let snapshot = with_metrics(|cache| {
        cache.put(t0(), q("::ffff:127.0.0.1", 676), expected.clone());
        assert_eq!(cache.lookup(t0(), &q("127.0.0.1", 676)), Some(expected.clone()));
        assert_eq!(cache.lookup(t0(), &q("127.0.0.1", 787)), None);
        assert_eq!(cache.lookup(t0(), &q("127.0.0.2", 676)), None);
    });
    assert_eq!(counter(&snapshot, telemetry::CACHE_HITS_TOTAL), 1);
    assert_eq!(counter(&snapshot, telemetry::CACHE_MISSES_TOTAL), 2);
    assert_eq!(gauge(&snapshot, telemetry::CACHE_SIZE_ENTRIES), 1.0);
}

#[test]
fn expire() {
    let a1 = answer("localhost", "Gi0/0/0/1", "Transit");
    let a2 = answer("localhost2", "Gi0/0/0/2", "Peering");
    let a3 = answer("localhost3", "Gi0/0/0/1", "IX");

    let snapshot = with_metrics(|cache| {
        let mut now = t0();
        cache.put(now, q("127.0.0.1", 676), a1.clone());
        now += minutes(10);
        cache.put(now, q("127.0.0.1", 678), a2.clone());
        now += minutes(10);
        cache.put(now, q("127.0.0.2", 678), a3.clone());
        now += minutes(10);

        // Lookups below happen at t0 so they never postpone expiry.
        let check = |expected: [Option<&Answer>; 3]| {
            assert_eq!(cache.lookup(t0(), &q("127.0.0.1", 676)).as_ref(), expected[0]);
            assert_eq!(cache.lookup(t0(), &q("127.0.0.1", 678)).as_ref(), expected[1]);
            assert_eq!(cache.lookup(t0(), &q("127.0.0.2", 678)).as_ref(), expected[2]);
        };

        assert_eq!(cache.expire(now - minutes(60)), 0);
        check([Some(&a1), Some(&a2), Some(&a3)]);
        assert_eq!(cache.expire(now - minutes(29)), 1);
        check([None, Some(&a2), Some(&a3)]);
        assert_eq!(cache.expire(now - minutes(19)), 1);
        check([None, None, Some(&a3)]);
        assert_eq!(cache.expire(now - minutes(9)), 1);
        check([None, None, None]);

        cache.put(now, q("127.0.0.1", 676), a1.clone());
        now += minutes(10);
        assert_eq!(cache.expire(now - minutes(19)), 0);
        assert_eq!(cache.lookup(now, &q("127.0.0.1", 676)), Some(a1.clone()));
    });

    assert_eq!(counter(&snapshot, telemetry::CACHE_EXPIRED_ENTRIES_TOTAL), 3);
    assert_eq!(counter(&snapshot, telemetry::CACHE_HITS_TOTAL), 7);
    assert_eq!(counter(&snapshot, telemetry::CACHE_MISSES_TOTAL), 6);
    assert_eq!(gauge(&snapshot, telemetry::CACHE_SIZE_ENTRIES), 1.0);
}

#[test]
fn lookup_postpones_expiry() {
    let a1 = answer("localhost", "Gi0/0/0/1", "Transit");
    let a2 = answer("localhost", "Gi0/0/0/2", "Peering");
    let a3 = answer("localhost2", "Gi0/0/0/1", "IX");
    let cache = MetadataCache::new();

    let mut now = t0();
    cache.put(now, q("127.0.0.1", 676), a1.clone());
    now += minutes(10);
    cache.put(now, q("127.0.0.1", 678), a2);
    now += minutes(10);
    cache.put(now, q("127.0.0.2", 678), a3.clone());
    now += minutes(10);
    assert!(cache.lookup(now, &q("127.0.0.1", 676)).is_some());
    now += minutes(10);

    cache.expire(now - minutes(29));
    assert_eq!(cache.lookup(now, &q("127.0.0.1", 676)), Some(a1));
    assert_eq!(cache.lookup(now, &q("127.0.0.1", 678)), None);
    assert_eq!(cache.lookup(now, &q("127.0.0.2", 678)), Some(a3));
}

#[test]
fn need_updates() {
    let transit = Interface::new("Gi0/0/0/1", "Transit", 0);
    let peering = Interface::new("Gi0/0/0/2", "Peering", 0);
    let ix = Interface::new("Gi0/0/0/1", "IX", 0);
    let cache = MetadataCache::new();

    let mut now = t0();
    cache.put(now, q("127.0.0.1", 676), Answer::new("localhost", transit.clone()));
    now += minutes(10);
    cache.put(now, q("127.0.0.1", 678), Answer::new("localhost", peering.clone()));
    now += minutes(10);
    cache.put(now, q("127.0.0.2", 678), Answer::new("localhost2", ix.clone()));
    now += minutes(10);
    cache.put(now, q("127.0.0.1", 676), Answer::new("localhost1", transit.clone()));
    now += minutes(10);
    // Reading does not delay a refresh.
    assert!(cache.lookup(now, &q("127.0.0.1", 678)).is_some());

    let ip1: Ipv6Addr = "::ffff:127.0.0.1".parse().unwrap();
    let ip2: Ipv6Addr = "::ffff:127.0.0.2".parse().unwrap();
    let cases = [
        (
            9,
            BTreeMap::from([
                (ip1, BTreeMap::from([(676, transit.clone()), (678, peering.clone())])),
                (ip2, BTreeMap::from([(678, ix.clone())])),
            ]),
        ),
        (
            19,
            BTreeMap::from([
                (ip1, BTreeMap::from([(678, peering.clone())])),
                (ip2, BTreeMap::from([(678, ix.clone())])),
            ]),
        ),
        (29, BTreeMap::from([(ip1, BTreeMap::from([(678, peering.clone())]))])),
        (39, BTreeMap::new()),
    ];
    for (age, expected) in cases {
        assert_eq!(cache.need_updates(now - minutes(age)), expected, "{age} minutes");
    }
}

#[test]
fn identical_put_updates_timestamps_only() {
    let cache = MetadataCache::new();
    let a = answer("localhost", "Gi0/0/0/1", "Transit");
    cache.put(t0(), q("127.0.0.1", 1), a.clone());
    cache.put(t0() + minutes(10), q("127.0.0.1", 1), a.clone());

    assert!(cache.need_updates(t0() + minutes(5)).is_empty());
    assert_eq!(cache.expire(t0() + minutes(5)), 0);
    assert_eq!(cache.lookup(t0(), &q("127.0.0.1", 1)), Some(a));
}

#[test]
fn save_and_load_keep_timestamps() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cache.json");
    let a1 = answer("localhost", "Gi0/0/0/1", "Transit");
    let a2 = answer("localhost", "Gi0/0/0/2", "Peering");

    let cache = MetadataCache::new();
    cache.put(t0(), q("127.0.0.1", 676), a1.clone());
    cache.put(t0() + minutes(20), q("2001:db8::1", 678), a2.clone());
    cache.save(&path).unwrap();

    let loaded = MetadataCache::new();
    loaded.load(&path).unwrap();
    assert_eq!(loaded.len(), 2);

    // The older entry is still the older one after reload.
    assert_eq!(loaded.expire(t0() + minutes(10)), 1);
    assert_eq!(loaded.lookup(t0() + minutes(30), &q("127.0.0.1", 676)), None);
    assert_eq!(
        loaded.lookup(t0() + minutes(30), &q("2001:db8::1", 678)),
        Some(a2)
    );
}

#[test]
fn load_does_not_exist() {
    let cache = MetadataCache::new();
    let err = cache.load(std::path::Path::new("/i/do/not/exist")).unwrap_err();
    assert!(err.is_not_found());
}

#[test]
fn load_future_version() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cache.json");
    std::fs::write(&path, r#"{"version": 999, "entries": []}"#).unwrap();

    let err = MetadataCache::new().load(&path).unwrap_err();
    assert!(matches!(
        err,
        MetadataError::CacheVersion { found: 999, expected } if expected == CACHE_FORMAT_VERSION
    ));
    assert!(!err.is_not_found());
}

#[test]
fn load_corrupt_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cache.json");
    std::fs::write(&path, "not json at all").unwrap();

    let err = MetadataCache::new().load(&path).unwrap_err();
    assert!(matches!(err, MetadataError::Json(_)));
}

#[test]
fn concurrent_operations() {
    const THREADS: usize = 8;
    const LOOKUPS: usize = 2_000;

    let snapshot = {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();
        // Handles are registered at construction, so other threads record
        // into the local recorder too.
        let cache = metrics::with_local_recorder(&recorder, || Arc::new(MetadataCache::new()));

        let handles: Vec<_> = (0..THREADS)
            .map(|i| {
                let cache = Arc::clone(&cache);
                thread::spawn(move || {
                    for n in 0..LOOKUPS {
                        let query = Query::new(std::net::Ipv4Addr::new(127, 0, 0, 1), (n % 50) as u32);
                        let now = t0() + Duration::from_secs(n as u64);
                        match (i + n) % 10 {
                            0 => cache.put(now, query, answer("localhost", "Gi0/0/0/1", "Transit")),
                            1 => {
                                cache.expire(now - minutes(1));
                            }
                            _ => {}
                        }
                        cache.lookup(now, &query);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        snapshotter.snapshot().into_vec()
    };

    let hits = counter(&snapshot, telemetry::CACHE_HITS_TOTAL);
    let misses = counter(&snapshot, telemetry::CACHE_MISSES_TOTAL);
    assert_eq!(hits + misses, (THREADS * LOOKUPS) as u64);
}

proptest! {
    #[test]
    fn lookup_after_put_always_hits(
        puts in prop::collection::vec((0u8..4, 0u32..16, 0u64..3600), 1..50),
    ) {
        let cache = MetadataCache::new();
        let mut latest = BTreeMap::new();
        for (i, (exporter, if_index, offset)) in puts.iter().enumerate() {
            let query = Query::new(std::net::Ipv4Addr::new(192, 0, 2, *exporter), *if_index);
            let a = Answer::new(format!("exporter{i}"), Interface::default());
            cache.put(t0() + Duration::from_secs(*offset), query, a.clone());
            latest.insert(query, a);
        }
        prop_assert_eq!(cache.len(), latest.len());
        for (query, a) in &latest {
            prop_assert_eq!(cache.lookup(t0() + minutes(120), query), Some(a.clone()));
        }
    }

    #[test]
    fn need_updates_matches_last_update(
        offsets in prop::collection::vec(0u64..100, 1..30),
        threshold in 0u64..100,
    ) {
        let cache = MetadataCache::new();
        for (i, offset) in offsets.iter().enumerate() {
            let query = Query::new(std::net::Ipv4Addr::new(192, 0, 2, 1), i as u32);
            cache.put(t0() + Duration::from_secs(*offset), query, Answer::default());
            // Access never matters for refresh.
            cache.lookup(t0() + minutes(500), &query);
        }
        let due: usize = cache
            .need_updates(t0() + Duration::from_secs(threshold))
            .values()
            .map(BTreeMap::len)
            .sum();
        let expected = offsets.iter().filter(|&&o| o < threshold).count();
        prop_assert_eq!(due, expected);
    }
}
