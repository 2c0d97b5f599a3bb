// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! Shared background worker.
//!
//! A single thread drains a FIFO work queue of side effects the data path
//! must not block on: fsync after WAL appends, closing rotated file
//! descriptors, and releasing potentially deep composite values. The
//! queue is one per server instance and is injected into each database at
//! construction.
//!
//! The queue stores its records in the lock-free list but serializes
//! push and pop through the wakeup mutex: reclaiming queue nodes is only
//! safe with the producers excluded, and the condition variable needs the
//! mutex anyway. The condition variable is notified on every push; no
//! work is ever dropped, and `Shutdown` terminates the loop after being
//! processed.

use crate::sync::list::LockFreeList;
use crate::value::obj::ValueHandle;
use log::{error, info};
use std::os::unix::io::RawFd;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};


/// One background work record.
pub enum BackgroundWork {
    /// Diagnostic; logged by the worker.
    Echo(String),
    /// `fsync(fd)`.
    SyncFile(RawFd),
    /// `close(fd)`.
    CloseFile(RawFd),
    /// Drop the handle off the data path.
    ReleaseValue(ValueHandle),
    /// Terminate the worker after this record.
    Shutdown,
}

/// FIFO queue feeding the background thread.
pub struct BackgroundQueue {
    works: LockFreeList<BackgroundWork>,
    mutex: Mutex<()>,
    cond: Condvar,
}

impl BackgroundQueue {
    pub fn new() -> Arc<BackgroundQueue> {
        Arc::new(BackgroundQueue {
            works: LockFreeList::new(),
            mutex: Mutex::new(()),
            cond: Condvar::new(),
        })
    }

    pub fn post_echo(&self, text: impl Into<String>) {
        self.push(BackgroundWork::Echo(text.into()));
    }

    pub fn post_sync_file(&self, fd: RawFd) {
        self.push(BackgroundWork::SyncFile(fd));
    }

    pub fn post_close_file(&self, fd: RawFd) {
        self.push(BackgroundWork::CloseFile(fd));
    }

    pub fn post_release_value(&self, value: ValueHandle) {
        self.push(BackgroundWork::ReleaseValue(value));
    }

    pub fn post_shutdown(&self) {
        self.push(BackgroundWork::Shutdown);
    }

    fn push(&self, work: BackgroundWork) {
        {
            let _guard = self.mutex.lock().expect("queue mutex poisoned");
            self.works.push_back(work);
        }
        self.cond.notify_one();
    }

    /// Blocks until a record is available.
    fn take(&self) -> BackgroundWork {
        let mut guard = self.mutex.lock().expect("queue mutex poisoned");
        loop {
            if let Some(work) = self.works.pop_front() {
                return work;
            }
            guard = self.cond.wait(guard).expect("queue mutex poisoned");
        }
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        let _guard = self.mutex.lock().expect("queue mutex poisoned");
        self.works.is_empty()
    }
}

/// The background thread handle.
pub struct Background {
    handle: Option<JoinHandle<()>>,
}

impl Background {
    pub fn new() -> Background {
        Background { handle: None }
    }

    /// Spawns the worker thread draining `queue` until `Shutdown`.
    pub fn async_run(&mut self, queue: Arc<BackgroundQueue>) {
        let handle = thread::Builder::new()
            .name("background".to_string())
            .spawn(move || loop {
                let work = queue.take();
                let stop = matches!(work, BackgroundWork::Shutdown);
                process_work(work);
                if stop {
                    info!("background worker stopped");
                    return;
                }
            })
            .expect("spawn background thread");
        self.handle = Some(handle);
    }

    /// Joins the worker; post `Shutdown` first.
    pub fn wait_for_shutdown(&mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("background worker panicked");
            }
        }
    }
}

impl Default for Background {
    fn default() -> Self {
        Background::new()
    }
}

fn process_work(work: BackgroundWork) {
    match work {
        BackgroundWork::Echo(text) => info!("background echo: {}", text),
        BackgroundWork::SyncFile(fd) => {
            if unsafe { libc::fsync(fd) } != 0 {
                error!("background fsync({}) failed: {}", fd, last_errno());
            }
        }
        BackgroundWork::CloseFile(fd) => {
            if unsafe { libc::close(fd) } != 0 {
                error!("background close({}) failed: {}", fd, last_errno());
            }
        }
        BackgroundWork::ReleaseValue(value) => drop(value),
        BackgroundWork::Shutdown => {}
    }
}

fn last_errno() -> std::io::Error {
    std::io::Error::last_os_error()
}
