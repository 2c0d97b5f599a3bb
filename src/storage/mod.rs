// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! Durable storage: WAL framing, table checkpoints, and replay.
//!
//! A persistent database owns one live log file and at most one table
//! file per committed version. The WAL carries framed mutation records;
//! a checkpoint streams the whole map into a CRC32-verified table file
//! and rotates the log. Recovery loads the committed table, then replays
//! the matching log in order.

pub mod redo;
pub mod table;
pub mod wal;

#[cfg(test)]
mod redo_test;
#[cfg(test)]
mod table_test;

// Re-export public API
pub use redo::{redo_command, replay_log};
pub use table::{dump_table, load_table, TableOptions, TABLE_MAGIC};
pub use wal::{BinLogReader, BinLogWriter, LoggedOp};
