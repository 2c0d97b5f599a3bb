// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! Hash-map database engine.
//!
//! Composes the concurrent map with the WAL and the table codec. The
//! durability state machine:
//!
//! ```text
//! Open(new)      -> write MANIFEST "0", create log-0        -> Running
//! Open(existing) -> read MANIFEST V, load table-V (if any),
//!                   replay log-V                            -> Running
//!
//! Running -- append_log --> append to log-V, enqueue fsync;
//!                           bytes >= threshold and not saving:
//!                               spawn saving thread for V+1
//! Running -- checkpoint(force) --> same work, synchronous
//!
//! saving thread (V+1):
//!     dump table-(V+1)              (map read-lock held across dump)
//!     create log-(V+1)
//!     under the engine mutex: swap the log stream, close old fd via
//!         the background worker, publish version V+1
//!     rewrite MANIFEST last
//!     garbage-collect files from V-1
//! ```
//!
//! Foreground writes during a save keep appending to log-V until the
//! rotation, and the manifest is rewritten only after the new pair is in
//! place, so a crash at any point recovers from the last committed
//! (table, log) pair.

use crate::background::BackgroundQueue;
use crate::command::CmdCode;
use crate::config::DbConf;
use crate::db::Db;
use crate::error::{AmberError, AmberResult};
use crate::map::ConcurrentHashMap;
use crate::storage::redo::replay_log;
use crate::storage::table::{dump_table, load_table, TableOptions};
use crate::storage::wal::BinLogWriter;
use crate::value::key::{KeyBoundle, Version};
use crate::value::obj::{Value, ValueHandle};
use log::{error, info, warn};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::os::unix::io::{AsRawFd, IntoRawFd};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::thread::{self, JoinHandle};

/// WAL bytes that trigger an asynchronous checkpoint.
const CHECKPOINT_THRESHOLD: u64 = 50 * 1024 * 1024;

struct WalState {
    writer: Option<BinLogWriter<File>>,
    version: u64,
}

/// The hash-map database engine.
pub struct HashDb {
    me: Weak<HashDb>,
    map: ConcurrentHashMap,
    dir: PathBuf,
    id: usize,
    persistent: bool,
    #[allow(dead_code)]
    memory_limit: u64,
    wal: Mutex<WalState>,
    saving: AtomicBool,
    saver: Mutex<Option<JoinHandle<()>>>,
    queue: Arc<BackgroundQueue>,
}

impl HashDb {
    pub fn new(
        conf: &DbConf,
        data_dir: &Path,
        id: usize,
        initial_slots: usize,
        queue: Arc<BackgroundQueue>,
    ) -> Arc<HashDb> {
        Arc::new_cyclic(|me| HashDb {
            me: me.clone(),
            map: ConcurrentHashMap::new(initial_slots),
            dir: data_dir.join(format!("db-{}", id)),
            id,
            persistent: conf.persistent,
            memory_limit: conf.memory_limit,
            wal: Mutex::new(WalState {
                writer: None,
                version: 0,
            }),
            saving: AtomicBool::new(false),
            saver: Mutex::new(None),
            queue,
        })
    }

    /// Committed version currently in the manifest/engine.
    pub fn version(&self) -> u64 {
        self.wal.lock().expect("wal mutex poisoned").version
    }

    fn manifest_path(&self) -> PathBuf {
        self.dir.join("MANIFEST")
    }

    fn table_path(&self, version: u64) -> PathBuf {
        self.dir.join(format!("table-{}", version))
    }

    fn log_path(&self, version: u64) -> PathBuf {
        self.dir.join(format!("log-{}", version))
    }

    fn read_manifest(&self) -> AmberResult<u64> {
        let path = self.manifest_path();
        let text = fs::read_to_string(&path)
            .map_err(|err| AmberError::io(format!("read_manifest: {}", path.display()), err))?;
        text.trim()
            .parse::<u64>()
            .map_err(|_| AmberError::corruption(format!("bad manifest content {:?}", text)))
    }

    /// Rewrites the manifest atomically: temp file, then rename.
    fn write_manifest(&self, version: u64) -> AmberResult<()> {
        let tmp_path = self.dir.join("MANIFEST.tmp");
        let mut tmp = File::create(&tmp_path)
            .map_err(|err| AmberError::io("create_manifest_tmp", err))?;
        tmp.write_all(version.to_string().as_bytes())
            .map_err(|err| AmberError::io("write_manifest", err))?;
        tmp.sync_all()
            .map_err(|err| AmberError::io("sync_manifest", err))?;
        fs::rename(&tmp_path, self.manifest_path())
            .map_err(|err| AmberError::io("rename_manifest", err))
    }

    fn open_log_for_append(&self, version: u64) -> AmberResult<(File, u64)> {
        let path = self.log_path(version);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|err| AmberError::io(format!("open_log: {}", path.display()), err))?;
        let existing = file
            .metadata()
            .map_err(|err| AmberError::io("stat_log", err))?
            .len();
        Ok((file, existing))
    }

    fn create_log(&self, version: u64) -> AmberResult<File> {
        let path = self.log_path(version);
        OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)
            .map_err(|err| AmberError::io(format!("create_log: {}", path.display()), err))
    }

    /// Joins a saving thread that has finished; called from the append
    /// path so the handle never outlives the next checkpoint decision.
    fn join_finished_saver(&self) {
        if self.saving.load(Ordering::Acquire) {
            return;
        }
        if let Some(handle) = self.saver.lock().expect("saver mutex poisoned").take() {
            if handle.join().is_err() {
                error!("db-{}: saving thread panicked", self.id);
            }
        }
    }

    fn spawn_saver(&self, next_version: u64) {
        let db = self.me.upgrade().expect("engine alive while serving");
        match thread::Builder::new()
            .name(format!("saving-{}", self.id))
            .spawn(move || {
                let _ = db.run_checkpoint(next_version);
            }) {
            Ok(handle) => {
                *self.saver.lock().expect("saver mutex poisoned") = Some(handle);
            }
            Err(err) => {
                error!("db-{}: cannot spawn saving thread: {}", self.id, err);
                self.saving.store(false, Ordering::Release);
            }
        }
    }

    /// Executes one checkpoint and always clears the saving flag.
    fn run_checkpoint(&self, next_version: u64) -> AmberResult<()> {
        let result = self.do_checkpoint(next_version);
        self.saving.store(false, Ordering::Release);
        if let Err(err) = &result {
            error!("db-{}: checkpoint to version {} failed: {}", self.id, next_version, err);
        }
        result
    }

    fn do_checkpoint(&self, next_version: u64) -> AmberResult<()> {
        info!("db-{}: checkpoint to version {} begins", self.id, next_version);

        let table_path = self.table_path(next_version);
        let options = TableOptions {
            file_name: &table_path,
            overwrite: true,
        };
        dump_table(&options, self)?;

        let new_log = self.create_log(next_version)?;
        {
            let mut state = self.wal.lock().expect("wal mutex poisoned");
            let writer = state
                .writer
                .as_mut()
                .ok_or_else(|| AmberError::invalid("database is not open"))?;
            let old_log = writer.reset(new_log);
            self.queue.post_close_file(old_log.into_raw_fd());
            state.version = next_version;
        }

        self.write_manifest(next_version)?;

        // The previous pair stays as recovery fallback; anything older
        // is garbage now.
        if next_version >= 2 {
            let stale = next_version - 2;
            let _ = fs::remove_file(self.table_path(stale));
            let _ = fs::remove_file(self.log_path(stale));
        }

        info!("db-{}: checkpoint to version {} complete", self.id, next_version);
        Ok(())
    }

    fn recover(&self, version: u64) -> AmberResult<()> {
        let table_path = self.table_path(version);
        if table_path.exists() {
            let options = TableOptions {
                file_name: &table_path,
                overwrite: false,
            };
            load_table(&options, self)?;
            info!(
                "db-{}: loaded table-{} ({} keys)",
                self.id,
                version,
                self.map.num_keys()
            );
        }

        let log_path = self.log_path(version);
        if log_path.exists() {
            let replayed = replay_log(&log_path, self)?;
            info!("db-{}: replayed {} records from log-{}", self.id, replayed, version);
        }
        Ok(())
    }

    /// Routes a displaced value to the background worker when dropping it
    /// might cascade through a deep composite.
    fn release_off_thread(&self, value: ValueHandle) {
        match &*value {
            Value::List(_) | Value::Hash(_) => self.queue.post_release_value(value),
            _ => drop(value),
        }
    }
}

impl Db for HashDb {
    fn open(&self) -> AmberResult<()> {
        fs::create_dir_all(&self.dir)
            .map_err(|err| AmberError::io(format!("create_db_dir: {}", self.dir.display()), err))?;
        if !self.persistent {
            info!("db-{}: open, in-memory only", self.id);
            return Ok(());
        }

        let mut state = self.wal.lock().expect("wal mutex poisoned");
        if self.manifest_path().exists() {
            let version = self.read_manifest()?;
            drop(state);
            self.recover(version)?;
            state = self.wal.lock().expect("wal mutex poisoned");
            let (file, existing) = self.open_log_for_append(version)?;
            state.writer = Some(BinLogWriter::resume(file, existing));
            state.version = version;
            info!("db-{}: open at version {}", self.id, version);
        } else {
            self.write_manifest(0)?;
            let file = self.create_log(0)?;
            state.writer = Some(BinLogWriter::new(file));
            state.version = 0;
            info!("db-{}: created at version 0", self.id);
        }
        Ok(())
    }

    fn put(&self, key: &[u8], version_number: u64, value: ValueHandle) -> AmberResult<()> {
        if let Some(displaced) = self.map.put(key, version_number, value) {
            self.release_off_thread(displaced);
        }
        Ok(())
    }

    fn get(&self, key: &[u8]) -> AmberResult<(Version, ValueHandle)> {
        self.map.get(key)
    }

    fn delete(&self, key: &[u8]) -> bool {
        match self.map.delete(key) {
            Some(value) => {
                self.release_off_thread(value);
                true
            }
            None => false,
        }
    }

    fn exec(&self, key: &[u8], proc: &mut dyn FnMut(Version, &ValueHandle)) -> AmberResult<()> {
        self.map.exec(key, |version, value| proc(version, value))
    }

    fn exec_mut(&self, key: &[u8], proc: &mut dyn FnMut(Version, &ValueHandle)) -> AmberResult<()> {
        self.map.exec_mut(key, |version, value| proc(version, value))
    }

    fn num_keys(&self) -> usize {
        self.map.num_keys()
    }

    fn append_log(&self, code: CmdCode, version: i64, args: &[ValueHandle]) -> AmberResult<()> {
        if !self.persistent {
            return Ok(());
        }
        self.join_finished_saver();

        let mut state = self.wal.lock().expect("wal mutex poisoned");
        let writer = state
            .writer
            .as_mut()
            .ok_or_else(|| AmberError::invalid("database is not open"))?;
        writer.append(code as u8, version, args).map_err(|err| {
            error!("db-{}: log append failed: {}", self.id, err);
            AmberError::io("append_log", err)
        })?;
        let fd = writer.stream().as_raw_fd();
        let written = writer.written_bytes();
        self.queue.post_sync_file(fd);

        if written >= CHECKPOINT_THRESHOLD && !self.saving.swap(true, Ordering::AcqRel) {
            let next_version = state.version + 1;
            drop(state);
            self.spawn_saver(next_version);
        }
        Ok(())
    }

    fn checkpoint(&self, force: bool) -> AmberResult<()> {
        if !self.persistent {
            return Ok(());
        }
        if !force {
            let state = self.wal.lock().expect("wal mutex poisoned");
            let written = state.writer.as_ref().map_or(0, |writer| writer.written_bytes());
            if written < CHECKPOINT_THRESHOLD {
                return Ok(());
            }
        }
        if self.saving.swap(true, Ordering::AcqRel) {
            warn!("db-{}: checkpoint already in flight, skipping", self.id);
            return Ok(());
        }
        let next_version = self.wal.lock().expect("wal mutex poisoned").version + 1;
        self.run_checkpoint(next_version)
    }

    fn snapshot(
        &self,
        visitor: &mut dyn FnMut(&KeyBoundle, &ValueHandle) -> io::Result<()>,
    ) -> AmberResult<()> {
        let mut iter = self.map.iter();
        iter.seek_to_first();
        while iter.valid() {
            visitor(iter.key(), iter.value())
                .map_err(|err| AmberError::io("snapshot_entry", err))?;
            iter.next();
        }
        Ok(())
    }
}

impl Drop for HashDb {
    fn drop(&mut self) {
        if let Some(handle) = self.saver.lock().expect("saver mutex poisoned").take() {
            // The saving thread itself can run this drop when it held the
            // last handle to the engine; it must not join itself.
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
    }
}
