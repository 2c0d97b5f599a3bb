// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! Worker threads.
//!
//! Each worker owns one event loop and every client session sharded to
//! it; sessions on the same worker are never concurrent. The listener
//! posts accepted sockets into the worker's inbox and wakes its poll.
//! Write interest is registered lazily once a session buffers a reply
//! and dropped again when the buffer drains. Closed descriptors are
//! handed to the background worker.

use crate::net::client::Client;
use crate::net::event::{EventLoop, Waker, READABLE, WRITABLE};
use crate::net::server::ServerContext;
use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::net::{SocketAddr, TcpStream};
use std::os::unix::io::{AsRawFd, RawFd};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

const POLL_TIMEOUT_MS: i32 = 100;

struct Inbox {
    conns: Mutex<Vec<(TcpStream, SocketAddr)>>,
    running: AtomicBool,
}

/// One event-loop thread and its sharded clients.
pub struct Worker {
    id: usize,
    inbox: Arc<Inbox>,
    waker: Waker,
    event_loop: Option<EventLoop>,
    ctx: Arc<ServerContext>,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    pub fn new(id: usize, max_events: usize, ctx: Arc<ServerContext>) -> crate::AmberResult<Worker> {
        let event_loop = EventLoop::new(max_events)?;
        let waker = event_loop.waker();
        Ok(Worker {
            id,
            inbox: Arc::new(Inbox {
                conns: Mutex::new(Vec::new()),
                running: AtomicBool::new(true),
            }),
            waker,
            event_loop: Some(event_loop),
            ctx,
            handle: None,
        })
    }

    /// Hands an accepted socket to this worker and wakes its poll.
    pub fn post_incoming(&self, stream: TcpStream, addr: SocketAddr) {
        self.inbox
            .conns
            .lock()
            .expect("worker inbox poisoned")
            .push((stream, addr));
        self.waker.wake();
    }

    pub fn async_run(&mut self) {
        let event_loop = self
            .event_loop
            .take()
            .expect("worker started twice");
        let inbox = Arc::clone(&self.inbox);
        let ctx = Arc::clone(&self.ctx);
        let id = self.id;
        let handle = thread::Builder::new()
            .name(format!("worker-{}", id))
            .spawn(move || run_loop(id, event_loop, inbox, ctx))
            .expect("spawn worker thread");
        self.handle = Some(handle);
    }

    /// Stops the loop and joins the thread.
    pub fn stop(&mut self) {
        self.inbox.running.store(false, Ordering::Release);
        self.waker.wake();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("worker-{} panicked", self.id);
            }
        }
    }
}

fn run_loop(id: usize, mut event_loop: EventLoop, inbox: Arc<Inbox>, ctx: Arc<ServerContext>) {
    let mut clients: HashMap<RawFd, Client> = HashMap::new();

    while inbox.running.load(Ordering::Acquire) {
        accept_incoming(id, &mut event_loop, &inbox, &ctx, &mut clients);

        let events = match event_loop.poll_once(POLL_TIMEOUT_MS) {
            Ok(events) => events,
            Err(err) => {
                error!("worker-{}: poll failed: {}", id, err);
                continue;
            }
        };

        for event in events {
            let Some(client) = clients.get_mut(&event.fd) else {
                continue;
            };

            let mut failed = event.error;
            if !failed && event.readable {
                if let Err(err) = client.on_readable() {
                    debug!("worker-{}: client {} read: {}", id, client.addr(), err);
                    failed = true;
                }
            }
            if !failed && event.writable {
                if let Err(err) = client.on_writable() {
                    debug!("worker-{}: client {} write: {}", id, client.addr(), err);
                    failed = true;
                }
            }

            if failed || client.should_close() {
                teardown(id, &mut event_loop, &mut clients, event.fd, &ctx);
                continue;
            }

            if client.wants_write() {
                // The descriptor is already in the table, so this cannot
                // overflow it.
                let _ = event_loop.register(event.fd, WRITABLE);
            } else {
                event_loop.unregister(event.fd, WRITABLE);
            }
        }
    }

    info!("worker-{} stopping, {} clients", id, clients.len());
    for (fd, client) in clients.drain() {
        event_loop.unregister_all(fd);
        ctx.queue.post_close_file(client.into_fd());
    }
}

fn accept_incoming(
    id: usize,
    event_loop: &mut EventLoop,
    inbox: &Inbox,
    ctx: &Arc<ServerContext>,
    clients: &mut HashMap<RawFd, Client>,
) {
    let incoming: Vec<(TcpStream, SocketAddr)> = {
        let mut conns = inbox.conns.lock().expect("worker inbox poisoned");
        conns.drain(..).collect()
    };

    for (stream, addr) in incoming {
        if let Err(err) = stream.set_nonblocking(true) {
            warn!("worker-{}: cannot make {} nonblocking: {}", id, addr, err);
            continue;
        }
        let fd = stream.as_raw_fd();
        match event_loop.register(fd, READABLE) {
            Ok(()) => {
                debug!("worker-{}: client {} registered", id, addr);
                clients.insert(fd, Client::new(stream, addr, Arc::clone(ctx)));
            }
            Err(err) => {
                warn!("worker-{}: rejecting {}: {}", id, addr, err);
                // Dropping the stream closes the socket.
            }
        }
    }
}

fn teardown(
    id: usize,
    event_loop: &mut EventLoop,
    clients: &mut HashMap<RawFd, Client>,
    fd: RawFd,
    ctx: &Arc<ServerContext>,
) {
    if let Some(client) = clients.remove(&fd) {
        info!("worker-{}: client {} disconnected", id, client.addr());
        event_loop.unregister_all(fd);
        ctx.queue.post_close_file(client.into_fd());
    }
}
