// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! Tests for the concurrent hash map.

#[cfg(test)]
mod tests {
    use crate::error::AmberError;
    use crate::map::ConcurrentHashMap;
    use crate::value::obj::Value;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_sanity() {
        let map = ConcurrentHashMap::new(1023);
        assert!(map.put(b"name", 0, Value::string("Jake")).is_none());
        assert!(map.put(b"age", 0, Value::string("100")).is_none());

        let (_, value) = map.get(b"name").unwrap();
        assert_eq!(value.as_bytes(), Some(&b"Jake"[..]));
        assert_eq!(map.num_keys(), 2);
    }

    #[test]
    fn test_overwrite_returns_displaced() {
        let map = ConcurrentHashMap::new(1023);
        let _ = map.put(b"k", 1, Value::string("one"));
        let displaced = map.put(b"k", 2, Value::string("two")).unwrap();
        assert_eq!(displaced.as_bytes(), Some(&b"one"[..]));
        assert_eq!(map.num_keys(), 1);

        let (_, value) = map.get(b"k").unwrap();
        assert_eq!(value.as_bytes(), Some(&b"two"[..]));
    }

    #[test]
    fn test_version_recorded_at_insert() {
        let map = ConcurrentHashMap::new(1023);
        let _ = map.put(b"k", 1234, Value::integer(1));
        let (version, _) = map.get(b"k").unwrap();
        assert_eq!(version.number, 1234);
    }

    #[test]
    fn test_deletion() {
        let map = ConcurrentHashMap::new(1023);
        let _ = map.put(b"id.1000", 0, Value::string("Jake"));
        let _ = map.put(b"id.1001", 0, Value::string("Jake"));
        let _ = map.put(b"id.1002", 0, Value::string("Jake"));

        assert!(map.delete(b"id.1000").is_some());
        assert!(map.delete(b"id.1002").is_some());
        assert!(map.delete(b"id.1001").is_some());
        assert!(map.delete(b"id.1000").is_none());

        match map.get(b"id.1000") {
            Err(AmberError::NotFound) => {}
            other => panic!("expected NotFound, got {:?}", other.map(|_| ())),
        }
        assert_eq!(map.num_keys(), 0);
    }

    #[test]
    fn test_empty_key_accepted() {
        let map = ConcurrentHashMap::new(1023);
        let _ = map.put(b"", 0, Value::integer(7));
        assert!(map.exists(b""));
        let (_, value) = map.get(b"").unwrap();
        assert_eq!(value.as_int(), Some(7));
        assert!(map.delete(b"").is_some());
    }

    #[test]
    fn test_resize_slots_targets_mid_band() {
        let map = ConcurrentHashMap::new(1023);
        let _ = map.put(b"1", 0, Value::string("Jake"));
        let _ = map.put(b"2", 0, Value::string("Jake"));
        let _ = map.put(b"3", 0, Value::string("Jake"));
        let _ = map.put(b"4", 0, Value::string("Jake"));
        assert_eq!(map.num_keys(), 4);

        map.resize_for(1023);
        assert_eq!(map.num_slots(), 1860);

        map.resize_for(1860);
        assert_eq!(map.num_slots(), 3381);

        map.resize_for(1);
        assert_eq!(map.num_slots(), 1023);

        for key in [b"1", b"2", b"3", b"4"] {
            assert!(map.exists(key), "key {:?} lost in rehash", key);
        }
    }

    #[test]
    fn test_load_triggered_growth_keeps_keys_findable() {
        let map = ConcurrentHashMap::new(16);
        for i in 0..10_000u32 {
            let _ = map.put(format!("{}", i).as_bytes(), 0, Value::integer(i64::from(i)));
        }
        assert_eq!(map.num_keys(), 10_000);
        assert!(map.num_slots() > 16);
        for i in 0..10_000u32 {
            let (_, value) = map.get(format!("{}", i).as_bytes()).unwrap();
            assert_eq!(value.as_int(), Some(i64::from(i)));
        }
    }

    #[test]
    fn test_shrink_returns_to_minimum() {
        let map = ConcurrentHashMap::new(16);
        for i in 0..5_000u32 {
            let _ = map.put(format!("{}", i).as_bytes(), 0, Value::integer(0));
        }
        for i in 0..5_000u32 {
            assert!(map.delete(format!("{}", i).as_bytes()).is_some());
        }
        assert_eq!(map.num_keys(), 0);
        assert_eq!(map.num_slots(), 16);
    }

    #[test]
    fn test_exec_observes_entry() {
        let map = ConcurrentHashMap::new(64);
        let _ = map.put(b"n", 9, Value::integer(33));
        let seen = map
            .exec(b"n", |version, value| (version.number, value.as_int()))
            .unwrap();
        assert_eq!(seen, (9, Some(33)));
        assert!(matches!(
            map.exec(b"missing", |_, _| ()),
            Err(AmberError::NotFound)
        ));
    }

    #[test]
    fn test_iterator_visits_everything_once() {
        let map = ConcurrentHashMap::new(64);
        for i in 0..100u32 {
            let _ = map.put(format!("key-{}", i).as_bytes(), 0, Value::integer(i64::from(i)));
        }
        let mut seen = std::collections::HashSet::new();
        let mut iter = map.iter();
        iter.seek_to_first();
        while iter.valid() {
            assert!(seen.insert(iter.key().key().to_vec()));
            iter.next();
        }
        assert_eq!(seen.len(), 100);
    }

    #[test]
    fn test_multi_thread_putting() {
        let map = Arc::new(ConcurrentHashMap::new(1023));
        let mut handles = Vec::new();
        for t in 0..8 {
            let map = Arc::clone(&map);
            handles.push(thread::spawn(move || {
                for i in t * 1000..(t + 1) * 1000 {
                    let _ = map.put(format!("{}", i).as_bytes(), 0, Value::string(format!("<{}>", i)));
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(map.num_keys(), 8000);
        for i in 0..8000 {
            assert!(map.exists(format!("{}", i).as_bytes()), "key {}", i);
        }
    }

    #[test]
    fn test_multi_thread_deleting() {
        let map = Arc::new(ConcurrentHashMap::new(1023));
        for i in 0..8000 {
            let _ = map.put(format!("{}", i).as_bytes(), 0, Value::string(format!("<{}>", i)));
        }
        assert_eq!(map.num_keys(), 8000);

        let mut handles = Vec::new();
        for t in 0..8 {
            let map = Arc::clone(&map);
            handles.push(thread::spawn(move || {
                for i in t * 1000..(t + 1) * 1000 {
                    assert!(map.delete(format!("{}", i).as_bytes()).is_some(), "key {}", i);
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(map.num_keys(), 0);
        assert_eq!(map.num_slots(), 1023);
    }

    #[test]
    fn test_multi_thread_getting_while_writing() {
        let map = Arc::new(ConcurrentHashMap::new(1023));
        let writer = {
            let map = Arc::clone(&map);
            thread::spawn(move || {
                for i in 0..8000 {
                    let _ = map.put(format!("{}", i).as_bytes(), 0, Value::string(format!("<{}>", i)));
                }
            })
        };

        let hits = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let mut readers = Vec::new();
        for t in 0..8usize {
            let map = Arc::clone(&map);
            let hits = Arc::clone(&hits);
            readers.push(thread::spawn(move || {
                for i in 0..8000usize {
                    let probe = (i * 31 + t * 7) % 8000;
                    if map.exists(format!("{}", probe).as_bytes()) {
                        hits.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                    }
                }
            }));
        }

        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
        assert!(hits.load(std::sync::atomic::Ordering::Relaxed) > 0);
    }
}
