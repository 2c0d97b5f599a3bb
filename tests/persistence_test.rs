// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! Durability: state survives a stop/restart cycle, corruption aborts.

use amberdb::background::{Background, BackgroundQueue};
use amberdb::command::CmdCode;
use amberdb::config::{DbConf, DbType};
use amberdb::db::{Db, HashDb};
use amberdb::error::AmberError;
use amberdb::value::obj::Value;
use std::sync::Arc;
use tempfile::TempDir;

struct Harness {
    queue: Arc<BackgroundQueue>,
    background: Background,
}

impl Harness {
    fn new() -> Harness {
        let queue = BackgroundQueue::new();
        let mut background = Background::new();
        background.async_run(Arc::clone(&queue));
        Harness { queue, background }
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.queue.post_shutdown();
        self.background.wait_for_shutdown();
    }
}

fn persistent_conf() -> DbConf {
    DbConf {
        db_type: DbType::Hash,
        persistent: true,
        memory_limit: 0,
    }
}

fn set(db: &HashDb, key: &str, value: &str) {
    let args = [Value::string(key), Value::string(value)];
    db.append_log(CmdCode::Set, 1, &args).unwrap();
    db.put(key.as_bytes(), 1, args[1].clone()).unwrap();
}

#[test]
fn test_state_survives_restart() {
    let dir = TempDir::new().unwrap();
    let harness = Harness::new();

    {
        let db = HashDb::new(&persistent_conf(), dir.path(), 0, 1023, Arc::clone(&harness.queue));
        db.open().unwrap();
        set(&db, "k1", "v1");
        set(&db, "k2", "v2");
    }

    // The manifest names a committed version and the live log holds the
    // writes that were never checkpointed.
    let db_dir = dir.path().join("db-0");
    let manifest: u64 = std::fs::read_to_string(db_dir.join("MANIFEST"))
        .unwrap()
        .trim()
        .parse()
        .unwrap();
    let log_len = std::fs::metadata(db_dir.join(format!("log-{}", manifest)))
        .unwrap()
        .len();
    assert!(log_len > 0);

    let db = HashDb::new(&persistent_conf(), dir.path(), 0, 1023, Arc::clone(&harness.queue));
    db.open().unwrap();
    assert_eq!(db.get(b"k1").unwrap().1.as_bytes(), Some(&b"v1"[..]));
    assert_eq!(db.get(b"k2").unwrap().1.as_bytes(), Some(&b"v2"[..]));
}

#[test]
fn test_checkpointed_state_survives_restart() {
    let dir = TempDir::new().unwrap();
    let harness = Harness::new();

    {
        let db = HashDb::new(&persistent_conf(), dir.path(), 0, 1023, Arc::clone(&harness.queue));
        db.open().unwrap();
        for i in 0..200 {
            set(&db, &format!("key-{}", i), &format!("value-{}", i));
        }
        db.checkpoint(true).unwrap();
        // Post-checkpoint writes land in the rotated log.
        set(&db, "after", "rotation");
        assert_eq!(db.version(), 1);
    }

    let db = HashDb::new(&persistent_conf(), dir.path(), 0, 1023, Arc::clone(&harness.queue));
    db.open().unwrap();
    assert_eq!(db.num_keys(), 201);
    assert_eq!(db.get(b"key-137").unwrap().1.as_bytes(), Some(&b"value-137"[..]));
    assert_eq!(db.get(b"after").unwrap().1.as_bytes(), Some(&b"rotation"[..]));
}

#[test]
fn test_recovered_state_equals_replayed_operations() {
    let dir = TempDir::new().unwrap();
    let harness = Harness::new();

    {
        let db = HashDb::new(&persistent_conf(), dir.path(), 0, 1023, Arc::clone(&harness.queue));
        db.open().unwrap();
        set(&db, "stays", "1");
        set(&db, "goes", "2");
        set(&db, "stays", "3");
        let args = [Value::string("goes")];
        db.append_log(CmdCode::Del, 0, &args).unwrap();
        db.delete(b"goes");
    }

    let db = HashDb::new(&persistent_conf(), dir.path(), 0, 1023, Arc::clone(&harness.queue));
    db.open().unwrap();
    assert_eq!(db.num_keys(), 1);
    assert_eq!(db.get(b"stays").unwrap().1.as_bytes(), Some(&b"3"[..]));
    assert!(matches!(db.get(b"goes"), Err(AmberError::NotFound)));
}

#[test]
fn test_corrupted_table_refuses_startup() {
    let dir = TempDir::new().unwrap();
    let harness = Harness::new();

    {
        let db = HashDb::new(&persistent_conf(), dir.path(), 0, 1023, Arc::clone(&harness.queue));
        db.open().unwrap();
        for i in 0..50 {
            set(&db, &format!("key-{}", i), "payload-payload-payload");
        }
        db.checkpoint(true).unwrap();
    }

    let table_path = dir.path().join("db-0").join("table-1");
    let mut bytes = std::fs::read(&table_path).unwrap();
    let middle = 16 + (bytes.len() - 16) / 2;
    bytes[middle] ^= 0xff;
    std::fs::write(&table_path, &bytes).unwrap();

    let db = HashDb::new(&persistent_conf(), dir.path(), 0, 1023, Arc::clone(&harness.queue));
    match db.open() {
        Err(err) => assert!(err.is_corruption(), "unexpected error {}", err),
        Ok(()) => panic!("open accepted a corrupt table"),
    }
}
