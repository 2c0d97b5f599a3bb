// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! AmberDB - in-memory-first multi-database key-value server.
//!
//! A lightweight key-value server in the Redis family: clients connect over
//! TCP, negotiate a text or binary framing, select one of several logical
//! databases, and issue commands over typed values (strings, integers,
//! lists, hashes). Databases are memory-first; persistent databases combine
//! a binary write-ahead log with periodic CRC32-verified checkpoints.
//!
//! ## Features
//!
//! - **Concurrent Hash Map**: per-slot reader/writer spin-locks under a
//!   table-wide lock that mediates rehash
//! - **Durability**: write-ahead logging plus asynchronous full-table
//!   checkpoints with atomic version rotation
//! - **Typed Values**: strings, integers, lock-free lists, and embedded
//!   hashes behind shared-ownership handles
//! - **Networking Core**: one listener, N worker event loops, one shared
//!   background thread for fsync/close/release work
//!
//! ## Architecture
//!
//! AmberDB is organized into modules:
//!
//! - **codec**: varint/zigzag encoding and length-prefixed stream I/O
//! - **sync**: reader/writer spin-lock and lock-free singly-linked list
//! - **value**: typed values, handles, and key boundle records
//! - **map**: the concurrent resizable hash map
//! - **storage**: WAL framing, table dump/load, and log replay
//! - **db**: the per-database durability engine
//! - **background**: the shared background work queue and worker thread
//! - **command**: the static command table
//! - **config**: TOML server configuration
//! - **net**: event loop, workers, client sessions, and the server

pub mod background;
pub mod codec;
pub mod command;
pub mod config;
pub mod db;
pub mod error;
pub mod map;
pub mod net;
pub mod storage;
pub mod sync;
pub mod value;

#[cfg(test)]
mod error_test;

// Re-export commonly used types
pub use config::{Config, DbConf, DbType};
pub use db::{new_db, Db};
pub use error::{AmberError, AmberResult};
pub use map::ConcurrentHashMap;
pub use net::Server;
pub use value::{Value, ValueHandle, Version};
