// Dictionary Cache Integration Tests
// Test ID Format: DICT-XXX

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use rusty_db::dictionary_cache::{
    kinds::SchemaEntity, DictionaryCacheConfig, GetOutcome, Loader, Lookup, SharedMultiMap,
};
use rusty_db::error::Result;

fn schema(id: u64, name: &str) -> SchemaEntity {
    SchemaEntity { id, name: name.to_string() }
}

// DICT-001: Concurrent gets on the same missing key coalesce into a
// single load; every waiter observes the result the loader reported.
#[test]
fn test_dict_001_concurrent_miss_coalesces() {
    let cache: Arc<SharedMultiMap<SchemaEntity>> =
        Arc::new(SharedMultiMap::new(DictionaryCacheConfig::default()).unwrap());
    let load_count = Arc::new(AtomicUsize::new(0));
    let barrier = Arc::new(Barrier::new(8));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let cache = Arc::clone(&cache);
            let load_count = Arc::clone(&load_count);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                match cache.get(Lookup::id(1)) {
                    GetOutcome::Load => {
                        load_count.fetch_add(1, Ordering::SeqCst);
                        // Simulate work done outside the lock before
                        // reporting the outcome.
                        thread::yield_now();
                        let handle = cache.put(Lookup::id(1), Some(schema(1, "shared"))).unwrap();
                        cache.release(handle);
                    }
                    GetOutcome::Hit(handle) => {
                        assert_eq!(cache.object(handle).name, "shared");
                        cache.release(handle);
                    }
                    GetOutcome::NotFound => panic!("unexpected negative result"),
                }
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(load_count.load(Ordering::SeqCst), 1, "exactly one thread should have become the loader");
    println!("DICT-001: PASSED - concurrent miss coalesced into a single load");
}

// DICT-002: A negative load unblocks every waiter with `NotFound` rather
// than letting any of them retry the loader.
#[test]
fn test_dict_002_negative_load_reported_to_waiters() {
    let cache: Arc<SharedMultiMap<SchemaEntity>> =
        Arc::new(SharedMultiMap::new(DictionaryCacheConfig::default()).unwrap());
    let barrier = Arc::new(Barrier::new(4));
    let not_found_count = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let cache = Arc::clone(&cache);
            let barrier = Arc::clone(&barrier);
            let not_found_count = Arc::clone(&not_found_count);
            thread::spawn(move || {
                barrier.wait();
                match cache.get(Lookup::id(99)) {
                    GetOutcome::Load => {
                        thread::yield_now();
                        assert!(cache.put(Lookup::id(99), None).is_none());
                    }
                    GetOutcome::NotFound => {
                        not_found_count.fetch_add(1, Ordering::SeqCst);
                    }
                    GetOutcome::Hit(_) => panic!("key was never inserted"),
                }
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(not_found_count.load(Ordering::SeqCst), 3);
    println!("DICT-002: PASSED - negative load reported to all waiters");
}

// DICT-003: Under a tight capacity, concurrent inserts still leave the
// cache within its bound once all handles are released.
#[test]
fn test_dict_003_concurrent_inserts_respect_capacity() {
    let cache: Arc<SharedMultiMap<SchemaEntity>> =
        Arc::new(SharedMultiMap::new(DictionaryCacheConfig::new(4)).unwrap());

    let handles: Vec<_> = (0..20u64)
        .map(|i| {
            let cache = Arc::clone(&cache);
            thread::spawn(move || {
                let handle = cache.put(Lookup::id(i), Some(schema(i, &format!("s{i}")))).unwrap();
                cache.release(handle);
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }

    assert!(cache.len() <= 4, "cache should have evicted down to capacity, got {}", cache.len());
    println!("DICT-003: PASSED - concurrent inserts respected capacity bound");
}

// DICT-004: A sticky, concurrently-shared element is never evicted while
// any thread still holds a reference, even under capacity pressure.
#[test]
fn test_dict_004_sticky_element_survives_concurrent_churn() {
    let cache: Arc<SharedMultiMap<SchemaEntity>> =
        Arc::new(SharedMultiMap::new(DictionaryCacheConfig::new(1)).unwrap());

    let pinned = cache.put(Lookup::id(1), Some(schema(1, "pinned"))).unwrap();
    cache.set_sticky(pinned, true);

    let handles: Vec<_> = (0..16u64)
        .map(|i| {
            let cache = Arc::clone(&cache);
            thread::spawn(move || {
                let handle = cache.put(Lookup::id(100 + i), Some(schema(100 + i, "churn"))).unwrap();
                cache.release(handle);
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(cache.object(pinned).name, "pinned");
    cache.set_sticky(pinned, false);
    cache.release(pinned);
    println!("DICT-004: PASSED - sticky element survived concurrent churn");
}

struct CountingLoader {
    calls: AtomicUsize,
}

impl Loader<SchemaEntity> for CountingLoader {
    fn load(&self, key: &Lookup<SchemaEntity>) -> Result<Option<SchemaEntity>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match key {
            Lookup::Id(id) => Ok(Some(schema(*id, "loaded"))),
            _ => Ok(None),
        }
    }
}

// DICT-005: get_or_load calls the loader at most once per key across a
// concurrent stampede on the same key.
#[test]
fn test_dict_005_get_or_load_stampede_calls_loader_once() {
    let cache: Arc<SharedMultiMap<SchemaEntity>> =
        Arc::new(SharedMultiMap::new(DictionaryCacheConfig::default()).unwrap());
    let loader = Arc::new(CountingLoader { calls: AtomicUsize::new(0) });
    let barrier = Arc::new(Barrier::new(10));

    let handles: Vec<_> = (0..10)
        .map(|_| {
            let cache = Arc::clone(&cache);
            let loader = Arc::clone(&loader);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                let handle = cache.get_or_load(Lookup::id(42), loader.as_ref()).unwrap().unwrap();
                assert_eq!(cache.object(handle).name, "loaded");
                cache.release(handle);
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(loader.calls.load(Ordering::SeqCst), 1);
    println!("DICT-005: PASSED - get_or_load stampede resulted in a single loader call");
}
