// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! File-event loop over poll(2).
//!
//! A fixed-capacity table of file descriptors with read/write interest
//! masks, polled in one `poll` call per iteration. A self-pipe lets other
//! threads interrupt a sleeping poll: the server wakes a worker after
//! posting it a fresh connection, and again when asking it to stop.

use crate::error::{AmberError, AmberResult};
use std::collections::HashMap;
use std::io;
use std::os::unix::io::RawFd;

/// Read-interest bit.
pub const READABLE: u8 = 0b01;

/// Write-interest bit.
pub const WRITABLE: u8 = 0b10;

/// One descriptor readiness report.
#[derive(Debug, Clone, Copy)]
pub struct FiredEvent {
    pub fd: RawFd,
    pub readable: bool,
    pub writable: bool,
    pub error: bool,
}

/// Cross-thread handle that interrupts a sleeping poll.
#[derive(Clone)]
pub struct Waker {
    pipe_write: RawFd,
}

impl Waker {
    pub fn wake(&self) {
        let byte = [1u8];
        // Best effort: a full pipe already guarantees a pending wakeup.
        unsafe {
            libc::write(self.pipe_write, byte.as_ptr() as *const libc::c_void, 1);
        }
    }
}

/// Poll-based event loop; owned by exactly one worker thread.
pub struct EventLoop {
    interests: HashMap<RawFd, u8>,
    max_events: usize,
    pipe_read: RawFd,
    pipe_write: RawFd,
}

impl EventLoop {
    pub fn new(max_events: usize) -> AmberResult<EventLoop> {
        let mut fds = [0 as RawFd; 2];
        if unsafe { libc::pipe(fds.as_mut_ptr()) } != 0 {
            return Err(AmberError::io("create_wake_pipe", io::Error::last_os_error()));
        }
        for fd in fds {
            set_nonblocking(fd)?;
        }
        Ok(EventLoop {
            interests: HashMap::new(),
            max_events,
            pipe_read: fds[0],
            pipe_write: fds[1],
        })
    }

    pub fn waker(&self) -> Waker {
        Waker {
            pipe_write: self.pipe_write,
        }
    }

    /// Adds interest bits for a descriptor.
    ///
    /// ## Error Conditions
    /// - `InvalidArgument`: the event table is full
    pub fn register(&mut self, fd: RawFd, mask: u8) -> AmberResult<()> {
        if !self.interests.contains_key(&fd) && self.interests.len() >= self.max_events {
            return Err(AmberError::invalid(format!(
                "event table full ({} descriptors)",
                self.max_events
            )));
        }
        *self.interests.entry(fd).or_insert(0) |= mask;
        Ok(())
    }

    /// Drops interest bits; the descriptor is forgotten when none remain.
    pub fn unregister(&mut self, fd: RawFd, mask: u8) {
        if let Some(interest) = self.interests.get_mut(&fd) {
            *interest &= !mask;
            if *interest == 0 {
                self.interests.remove(&fd);
            }
        }
    }

    pub fn unregister_all(&mut self, fd: RawFd) {
        self.interests.remove(&fd);
    }

    pub fn has_interest(&self, fd: RawFd, mask: u8) -> bool {
        self.interests
            .get(&fd)
            .is_some_and(|interest| interest & mask != 0)
    }

    pub fn num_registered(&self) -> usize {
        self.interests.len()
    }

    /// Polls once, returning the descriptors that fired. A wakeup through
    /// the self-pipe is drained and produces an empty-handed return
    /// rather than an event.
    pub fn poll_once(&mut self, timeout_ms: i32) -> AmberResult<Vec<FiredEvent>> {
        let mut pollfds = Vec::with_capacity(self.interests.len() + 1);
        pollfds.push(libc::pollfd {
            fd: self.pipe_read,
            events: libc::POLLIN,
            revents: 0,
        });
        for (&fd, &interest) in &self.interests {
            let mut events = 0i16;
            if interest & READABLE != 0 {
                events |= libc::POLLIN;
            }
            if interest & WRITABLE != 0 {
                events |= libc::POLLOUT;
            }
            pollfds.push(libc::pollfd {
                fd,
                events,
                revents: 0,
            });
        }

        let fired = unsafe { libc::poll(pollfds.as_mut_ptr(), pollfds.len() as libc::nfds_t, timeout_ms) };
        if fired < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(Vec::new());
            }
            return Err(AmberError::io("poll", err));
        }

        let mut events = Vec::new();
        for pollfd in &pollfds {
            if pollfd.revents == 0 {
                continue;
            }
            if pollfd.fd == self.pipe_read {
                self.drain_wake_pipe();
                continue;
            }
            events.push(FiredEvent {
                fd: pollfd.fd,
                readable: pollfd.revents & libc::POLLIN != 0,
                writable: pollfd.revents & libc::POLLOUT != 0,
                error: pollfd.revents & (libc::POLLERR | libc::POLLHUP | libc::POLLNVAL) != 0,
            });
        }
        Ok(events)
    }

    fn drain_wake_pipe(&self) {
        let mut scratch = [0u8; 64];
        loop {
            let n = unsafe {
                libc::read(
                    self.pipe_read,
                    scratch.as_mut_ptr() as *mut libc::c_void,
                    scratch.len(),
                )
            };
            if n <= 0 {
                return;
            }
        }
    }
}

impl Drop for EventLoop {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.pipe_read);
            libc::close(self.pipe_write);
        }
    }
}

fn set_nonblocking(fd: RawFd) -> AmberResult<()> {
    unsafe {
        let flags = libc::fcntl(fd, libc::F_GETFL);
        if flags < 0 || libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) < 0 {
            return Err(AmberError::io("set_nonblocking", io::Error::last_os_error()));
        }
    }
    Ok(())
}
