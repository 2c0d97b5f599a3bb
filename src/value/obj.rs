// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! Typed values.
//!
//! A value is a tagged variant over exactly four cases: byte string,
//! 64-bit signed integer, lock-free list, and embedded hash map. Values
//! are shared through [`ValueHandle`] (clone to grab a reference, drop to
//! release); when the last handle drops, composite values release their
//! children transitively, which is why the database engine may hand a
//! displaced composite to the background worker instead of dropping it on
//! the data path.
//!
//! ## Serialization
//!
//! Self-describing, one tag byte then a type-specific payload:
//!
//! - integer: `[1][zigzag-varint64]`
//! - list:    `[2][varint32 count][element ...]` (recursive)
//! - string:  `[3][varint64 length][bytes]`
//! - hash:    `[4][varint32 count][(varint64 key-length, key, value) ...]`
//!
//! Deserialization reports truncation, bad tags, and overlong varints as
//! `std::io` errors; callers map them to `Corruption` at their boundary.

use crate::codec::serial::{SerializedReader, SerializedWriter};
use crate::map::ConcurrentHashMap;
use crate::sync::list::LockFreeList;
use std::io::{self, Read, Write};
use std::sync::Arc;

pub const TAG_INTEGER: u8 = 1;
pub const TAG_LIST: u8 = 2;
pub const TAG_STRING: u8 = 3;
pub const TAG_HASH: u8 = 4;

/// Slot floor for hash values nested inside another database entry.
const NESTED_HASH_SLOTS: usize = 33;

/// Longest accepted byte string (length fits in 32 bits).
const MAX_STRING_LEN: usize = u32::MAX as usize;

/// Shared-ownership handle to a value.
///
/// Cloning grabs a reference, dropping releases it; the last drop destroys
/// the value and, for composites, its children.
pub type ValueHandle = Arc<Value>;

/// A typed database value.
pub enum Value {
    String(Vec<u8>),
    Integer(i64),
    List(LockFreeList<ValueHandle>),
    Hash(ConcurrentHashMap),
}

impl Value {
    pub fn string(bytes: impl Into<Vec<u8>>) -> ValueHandle {
        Arc::new(Value::String(bytes.into()))
    }

    pub fn integer(value: i64) -> ValueHandle {
        Arc::new(Value::Integer(value))
    }

    pub fn tag(&self) -> u8 {
        match self {
            Value::Integer(_) => TAG_INTEGER,
            Value::List(_) => TAG_LIST,
            Value::String(_) => TAG_STRING,
            Value::Hash(_) => TAG_HASH,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::String(_) => "string",
            Value::Integer(_) => "integer",
            Value::List(_) => "list",
            Value::Hash(_) => "hash",
        }
    }

    /// Coerces to an integer: native integers directly, strings by strict
    /// decimal parsing.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Integer(value) => Some(*value),
            Value::String(bytes) => parse_i64(bytes),
            _ => None,
        }
    }

    /// The string bytes, when this is a string value.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::String(bytes) => Some(bytes),
            _ => None,
        }
    }
}

impl std::fmt::Debug for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::String(bytes) => write!(f, "String({:?})", String::from_utf8_lossy(bytes)),
            Value::Integer(value) => write!(f, "Integer({})", value),
            Value::List(list) => write!(f, "List(len={})", list.len()),
            Value::Hash(map) => write!(f, "Hash(keys={})", map.num_keys()),
        }
    }
}

/// Strict decimal parse of a byte string: optional leading minus, digits
/// only, overflow rejected.
pub fn parse_i64(bytes: &[u8]) -> Option<i64> {
    if bytes.is_empty() {
        return None;
    }
    let (negative, digits) = match bytes[0] {
        b'-' => (true, &bytes[1..]),
        _ => (false, bytes),
    };
    if digits.is_empty() {
        return None;
    }
    let mut value: i64 = 0;
    for &c in digits {
        if !c.is_ascii_digit() {
            return None;
        }
        value = value
            .checked_mul(10)?
            .checked_add(i64::from(c - b'0'))?;
    }
    Some(if negative { -value } else { value })
}

/// Serializes one value, returning the byte count written.
pub fn serialize_value<W: Write>(
    value: &Value,
    writer: &mut SerializedWriter<W>,
) -> io::Result<usize> {
    let mut size = writer.write_byte(value.tag())?;
    match value {
        Value::Integer(v) => {
            size += writer.write_svarint64(*v)?;
        }
        Value::String(bytes) => {
            size += writer.write_slice(bytes)?;
        }
        Value::List(list) => {
            // Stage elements so the emitted count matches what was walked
            // even if the list grows underneath us.
            let mut staged = SerializedWriter::new(Vec::new());
            let mut count: u32 = 0;
            for elem in list.iter() {
                serialize_value(elem, &mut staged)?;
                count += 1;
            }
            size += writer.write_varint32(count)?;
            size += writer.write_raw(&staged.into_inner())?;
        }
        Value::Hash(map) => {
            let mut staged = SerializedWriter::new(Vec::new());
            let mut count: u32 = 0;
            let mut iter = map.iter();
            iter.seek_to_first();
            while iter.valid() {
                staged.write_slice(iter.key().key())?;
                serialize_value(iter.value(), &mut staged)?;
                count += 1;
                iter.next();
            }
            size += writer.write_varint32(count)?;
            size += writer.write_raw(&staged.into_inner())?;
        }
    }
    Ok(size)
}

/// Deserializes one value.
///
/// ## Error Conditions
/// - `UnexpectedEof`: truncated input
/// - `InvalidData`: tag out of range, overlong varint, oversized length
pub fn deserialize_value<R: Read>(reader: &mut SerializedReader<R>) -> io::Result<ValueHandle> {
    let tag = reader.read_byte()?;
    match tag {
        TAG_INTEGER => Ok(Value::integer(reader.read_svarint64()?)),
        TAG_STRING => Ok(Value::string(reader.read_slice(MAX_STRING_LEN)?)),
        TAG_LIST => {
            let count = reader.read_varint32()?;
            let list = LockFreeList::new();
            for _ in 0..count {
                list.push_back(deserialize_value(reader)?);
            }
            Ok(Arc::new(Value::List(list)))
        }
        TAG_HASH => {
            let count = reader.read_varint32()?;
            let map = ConcurrentHashMap::new(NESTED_HASH_SLOTS);
            for _ in 0..count {
                let key = reader.read_slice(MAX_STRING_LEN)?;
                let value = deserialize_value(reader)?;
                let _ = map.put(&key, 0, value);
            }
            Ok(Arc::new(Value::Hash(map)))
        }
        _ => Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("bad value tag {}", tag),
        )),
    }
}
