// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! Binary encoding primitives.
//!
//! Varint/zigzag integer encoding and the length-prefixed stream layer the
//! WAL, the table codec, and the binary wire protocol are built on.

pub mod serial;
pub mod varint;

#[cfg(test)]
mod varint_test;

// Re-export public API
pub use serial::{CrcReader, CrcWriter, SerializedReader, SerializedWriter};
pub use varint::{
    decode32, decode64, encode32, encode64, sizeof32, sizeof64, zigzag64, unzigzag64,
    MAX32_LEN, MAX64_LEN,
};
