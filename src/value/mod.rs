// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! Typed values and key records.
//!
//! Values are a tagged variant (string, integer, list, hash) behind a
//! shared-ownership handle; key boundles are the packed (key, type,
//! version) records stored per map entry.

pub mod key;
pub mod obj;

#[cfg(test)]
mod obj_test;

// Re-export public API
pub use key::{KeyBoundle, Version};
pub use obj::{
    deserialize_value, parse_i64, serialize_value, Value, ValueHandle, TAG_HASH, TAG_INTEGER,
    TAG_LIST, TAG_STRING,
};
