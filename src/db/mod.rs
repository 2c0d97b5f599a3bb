// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! The per-database engine.
//!
//! A database owns a concurrent hash map and, when persistent, a live WAL
//! plus checkpointed table files under its own `db-<id>/` directory. The
//! `Db` trait is the surface client sessions and replay speak to; the
//! `hash` engine is the only implemented kind, the `order` and `page`
//! configuration slots are reserved.

pub mod hash;


use crate::background::BackgroundQueue;
use crate::command::CmdCode;
use crate::config::{DbConf, DbType};
use crate::error::{AmberError, AmberResult};
use crate::value::key::{KeyBoundle, Version};
use crate::value::obj::ValueHandle;
use std::io;
use std::path::Path;
use std::sync::Arc;

pub use hash::HashDb;

/// Default slot floor for a database map.
pub const DEFAULT_INITIAL_SLOTS: usize = 1023;

/// One logical database.
pub trait Db: Send + Sync {
    /// Loads (or creates) the on-disk state; must run before serving.
    fn open(&self) -> AmberResult<()>;

    /// Inserts or overwrites a key.
    fn put(&self, key: &[u8], version_number: u64, value: ValueHandle) -> AmberResult<()>;

    /// Reads the version and a shared handle for a key.
    fn get(&self, key: &[u8]) -> AmberResult<(Version, ValueHandle)>;

    /// Removes a key; true when it existed.
    fn delete(&self, key: &[u8]) -> bool;

    /// Runs `proc` on an entry under the slot read-lock.
    fn exec(
        &self,
        key: &[u8],
        proc: &mut dyn FnMut(Version, &ValueHandle),
    ) -> AmberResult<()>;

    /// Runs `proc` on an entry under the slot write-lock; required for
    /// anything that unlinks list nodes.
    fn exec_mut(
        &self,
        key: &[u8],
        proc: &mut dyn FnMut(Version, &ValueHandle),
    ) -> AmberResult<()>;

    fn num_keys(&self) -> usize;

    /// Appends one record to the write-ahead log. Mutating commands call
    /// this before touching the map, so a record is durable (modulo the
    /// deferred fsync) before its mutation is visible.
    fn append_log(&self, code: CmdCode, version: i64, args: &[ValueHandle]) -> AmberResult<()>;

    /// Checkpoints the database: dump the map to `table-(V+1)`, rotate the
    /// log, publish the new version. `force` skips the threshold check.
    fn checkpoint(&self, force: bool) -> AmberResult<()>;

    /// Visits every entry under the map's snapshot iterator.
    fn snapshot(
        &self,
        visitor: &mut dyn FnMut(&KeyBoundle, &ValueHandle) -> io::Result<()>,
    ) -> AmberResult<()>;
}

/// Builds a database for one `[[db]]` configuration entry.
///
/// ## Error Conditions
/// - `InvalidArgument`: the `order` and `page` types are reserved slots
///   with no engine behind them
pub fn new_db(
    conf: &DbConf,
    data_dir: &Path,
    id: usize,
    queue: Arc<BackgroundQueue>,
) -> AmberResult<Arc<dyn Db>> {
    match conf.db_type {
        DbType::Hash => Ok(HashDb::new(conf, data_dir, id, DEFAULT_INITIAL_SLOTS, queue)),
        DbType::Order | DbType::Page => Err(AmberError::invalid(format!(
            "db-{}: type {:?} is reserved and not implemented",
            id, conf.db_type
        ))),
    }
}
