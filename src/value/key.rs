// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! Key boundle records.
//!
//! A key boundle is one contiguous allocation holding a self-describing
//! record:
//!
//! ```text
//! [key-length (varint32)][key bytes][type (u8)][version (varint64)]
//! ```
//!
//! The map allocates a boundle when a key is first inserted and frees it
//! when the entry is removed; table files store the raw record verbatim.

use crate::codec::varint;

/// Decoded (type, number) pair of a boundle's trailing bytes.
///
/// The number is an opaque monotonic counter supplied by the caller,
/// typically a millisecond wall-clock stamp, and occupies at most 56 bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Version {
    pub tag: u8,
    pub number: u64,
}

/// Packed (key, type, version) record in a single allocation.
pub struct KeyBoundle {
    raw: Box<[u8]>,
}

impl KeyBoundle {
    /// Builds a boundle from its parts.
    pub fn build(key: &[u8], tag: u8, version_number: u64) -> KeyBoundle {
        let mut raw = Vec::with_capacity(Self::predict_size(key, version_number));
        let mut scratch = [0u8; varint::MAX64_LEN];
        let n = varint::encode32(key.len() as u32, &mut scratch);
        raw.extend_from_slice(&scratch[..n]);
        raw.extend_from_slice(key);
        raw.push(tag);
        let n = varint::encode64(version_number, &mut scratch);
        raw.extend_from_slice(&scratch[..n]);
        KeyBoundle {
            raw: raw.into_boxed_slice(),
        }
    }

    /// Exact encoded size of a boundle for the given parts.
    pub fn predict_size(key: &[u8], version_number: u64) -> usize {
        varint::sizeof32(key.len() as u32) + key.len() + 1 + varint::sizeof64(version_number)
    }

    /// The key bytes.
    pub fn key(&self) -> &[u8] {
        let (len, consumed) = varint::decode32(&self.raw).expect("well-formed boundle");
        &self.raw[consumed..consumed + len as usize]
    }

    /// The trailing (type, version-number) pair.
    pub fn version(&self) -> Version {
        let (len, consumed) = varint::decode32(&self.raw).expect("well-formed boundle");
        let at = consumed + len as usize;
        let tag = self.raw[at];
        let (number, _) = varint::decode64(&self.raw[at + 1..]).expect("well-formed boundle");
        Version { tag, number }
    }

    /// The whole record, as stored in table files.
    pub fn raw_bytes(&self) -> &[u8] {
        &self.raw
    }
}

impl std::fmt::Debug for KeyBoundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyBoundle")
            .field("key", &String::from_utf8_lossy(self.key()))
            .field("version", &self.version())
            .finish()
    }
}
