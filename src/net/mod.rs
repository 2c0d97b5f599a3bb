// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! Networking core.
//!
//! One listener thread accepts connections and shards them round-robin to
//! N worker threads. Each worker owns a poll(2) event loop and the client
//! sessions living on it; sessions within one worker are never concurrent
//! with each other. Sessions stage reads in a circular buffer, frame
//! commands in the negotiated protocol, and buffer replies until the
//! socket drains them.

pub mod client;
pub mod event;
pub mod ring;
pub mod server;
pub mod worker;


// Re-export public API
pub use client::Client;
pub use event::{EventLoop, FiredEvent, Waker, READABLE, WRITABLE};
pub use ring::CircularBuffer;
pub use server::{Server, ServerContext};
pub use worker::Worker;
