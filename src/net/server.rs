// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! Server orchestrator.
//!
//! Owns the databases, the background worker, and the worker pool. Init
//! opens every configured database (recovery corruption aborts startup),
//! binds the listener, and spawns the threads; `run` then accepts
//! connections on the calling thread and shards them round-robin across
//! the workers.

use crate::background::{Background, BackgroundQueue};
use crate::config::Config;
use crate::db::{new_db, Db};
use crate::error::{AmberError, AmberResult};
use crate::net::worker::Worker;
use log::{error, info};
use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;

/// Read-only state shared by every client session.
pub struct ServerContext {
    pub dbs: Vec<Arc<dyn Db>>,
    pub auth_required: bool,
    pub pass_digest: String,
    pub queue: Arc<BackgroundQueue>,
}

/// Millisecond wall-clock stamp used as the version of creation writes.
pub fn current_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// The server: listener, worker pool, background thread, databases.
pub struct Server {
    config: Config,
    max_events: usize,
    workers: Vec<Worker>,
    background: Background,
    queue: Option<Arc<BackgroundQueue>>,
    listener: Option<TcpListener>,
    next_worker: usize,
}

impl Server {
    pub fn new(config: Config, max_events: usize) -> Server {
        Server {
            config,
            max_events,
            workers: Vec::new(),
            background: Background::new(),
            queue: None,
            listener: None,
            next_worker: 0,
        }
    }

    /// Opens databases, binds the listener, and spawns every thread.
    ///
    /// ## Error Conditions
    /// - `Corruption`: recovery found damaged persistent state; the
    ///   server refuses to start rather than silently discard data
    /// - `InvalidArgument`: a reserved db type is configured
    /// - `IoError`: the listener cannot bind
    pub fn init(&mut self) -> AmberResult<()> {
        let queue = BackgroundQueue::new();

        let mut dbs: Vec<Arc<dyn Db>> = Vec::new();
        for (id, db_conf) in self.config.dbs.iter().enumerate() {
            let db = new_db(db_conf, &self.config.data_dir, id, Arc::clone(&queue))?;
            db.open()?;
            dbs.push(db);
        }
        info!("{} database(s) open", dbs.len());

        let ctx = Arc::new(ServerContext {
            dbs,
            auth_required: self.config.auth,
            pass_digest: self.config.pass_digest.clone(),
            queue: Arc::clone(&queue),
        });

        let listener = TcpListener::bind((self.config.address.as_str(), self.config.port))
            .map_err(|err| {
                AmberError::io(
                    format!("listen {}:{}", self.config.address, self.config.port),
                    err,
                )
            })?;
        info!(
            "listening on {}",
            listener
                .local_addr()
                .map(|addr| addr.to_string())
                .unwrap_or_default()
        );

        self.background.async_run(Arc::clone(&queue));

        for id in 0..self.config.num_workers {
            let mut worker = Worker::new(id, self.max_events, Arc::clone(&ctx))?;
            worker.async_run();
            self.workers.push(worker);
        }

        self.queue = Some(queue);
        self.listener = Some(listener);
        Ok(())
    }

    /// Bound listener address; available after `init`.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref().and_then(|l| l.local_addr().ok())
    }

    /// Accept loop; runs on the calling thread until the listener fails.
    pub fn run(&mut self) {
        let listener = match self.listener.as_ref() {
            Some(listener) => listener,
            None => {
                error!("run before init");
                return;
            }
        };

        loop {
            match listener.accept() {
                Ok((stream, addr)) => {
                    let index = self.next_worker % self.workers.len();
                    self.next_worker = self.next_worker.wrapping_add(1);
                    info!("accept {} -> worker-{}", addr, index);
                    self.workers[index].post_incoming(stream, addr);
                }
                Err(err) => {
                    error!("accept fail: {}", err);
                }
            }
        }
    }

    /// Stops workers, drains the background queue, joins every thread.
    pub fn shutdown(&mut self) {
        for worker in &mut self.workers {
            worker.stop();
        }
        if let Some(queue) = self.queue.take() {
            queue.post_shutdown();
        }
        self.background.wait_for_shutdown();
        info!("server stopped");
    }
}
