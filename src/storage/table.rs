// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! Table file dump and load.
//!
//! File layout:
//!
//! ```text
//! offset 0..4    ASCII "*YKN"
//! offset 4..8    crc32 of everything from offset 16 (little-endian)
//! offset 8..16   reserved, zeroed
//! offset 16..    entries: [varint32 klen][key][type u8][varint64 version]
//!                         [serialized value]
//! ```
//!
//! Dump writes the header with a zeroed checksum, streams entries through
//! a crc proxy, then seeks back and patches the real checksum in. Load
//! verifies the magic, streams entries through a crc proxy into `put`,
//! and compares the accumulated checksum against the stored one at the
//! end; any mismatch is corruption.
//!
//! The dump iterator pins the map's giant read-lock for the whole pass,
//! so rehash is blocked for the duration of a checkpoint.

use crate::codec::serial::{CrcReader, CrcWriter, SerializedReader, SerializedWriter};
use crate::db::Db;
use crate::error::{AmberError, AmberResult};
use crate::value::obj::{deserialize_value, serialize_value, ValueHandle};
use std::fs::OpenOptions;
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

/// Leading magic of every table file.
pub const TABLE_MAGIC: &[u8; 4] = b"*YKN";

const HEADER_LEN: usize = 16;
const CHECKSUM_OFFSET: u64 = 4;

/// Longest accepted key in an entry (length fits in 32 bits).
const MAX_KEY_LEN: usize = u32::MAX as usize;

/// Dump/load parameters.
pub struct TableOptions<'a> {
    pub file_name: &'a Path,
    /// When false the dump refuses to clobber an existing file
    /// (`O_CREAT|O_EXCL` semantics).
    pub overwrite: bool,
}

/// Streams every entry of `db` into a fresh table file.
pub fn dump_table(options: &TableOptions<'_>, db: &dyn Db) -> AmberResult<()> {
    let mut open_options = OpenOptions::new();
    open_options.write(true);
    if options.overwrite {
        open_options.create(true).truncate(true);
    } else {
        open_options.create_new(true);
    }
    let mut file = open_options
        .open(options.file_name)
        .map_err(|err| AmberError::io("open_table", err))?;

    let mut header = [0u8; HEADER_LEN];
    header[..4].copy_from_slice(TABLE_MAGIC);
    file.write_all(&header)
        .map_err(|err| AmberError::io("write_table_header", err))?;

    let mut proxy = CrcWriter::new(BufWriter::new(&mut file));
    {
        let mut serializer = SerializedWriter::new(&mut proxy);
        db.snapshot(&mut |key, value| {
            serializer.write_raw(key.raw_bytes())?;
            serialize_value(value, &mut serializer)?;
            Ok(())
        })?;
    }
    let checksum = proxy.checksum();
    proxy
        .into_inner()
        .flush()
        .map_err(|err| AmberError::io("flush_table", err))?;

    file.seek(SeekFrom::Start(CHECKSUM_OFFSET))
        .map_err(|err| AmberError::io("seek_table", err))?;
    file.write_all(&checksum.to_le_bytes())
        .map_err(|err| AmberError::io("write_table_checksum", err))?;
    file.sync_all()
        .map_err(|err| AmberError::io("sync_table", err))?;
    Ok(())
}

/// Loads a table file into `db` through `put`.
///
/// ## Error Conditions
/// - `Corruption`: bad magic, truncated entry, bad value tag, or a
///   checksum that does not match the stored one
/// - `IoError`: the file cannot be opened or read
pub fn load_table(options: &TableOptions<'_>, db: &dyn Db) -> AmberResult<()> {
    let mut file = OpenOptions::new()
        .read(true)
        .open(options.file_name)
        .map_err(|err| AmberError::io("open_table", err))?;

    let mut header = [0u8; HEADER_LEN];
    file.read_exact(&mut header)
        .map_err(|_| AmberError::corruption("short table file header"))?;
    if &header[..4] != TABLE_MAGIC {
        return Err(AmberError::corruption(
            "bad table file header, not an amber table file",
        ));
    }
    let stored_checksum = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);

    let mut proxy = SerializedReader::new(CrcReader::new(BufReader::new(&mut file)));
    loop {
        let key_len = match proxy.read_varint32() {
            Ok(len) => len,
            Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => break,
            Err(err) => return Err(AmberError::corruption(format!("bad table entry: {}", err))),
        };
        if key_len as usize > MAX_KEY_LEN {
            return Err(AmberError::corruption("table entry key too long"));
        }
        let entry = read_entry(&mut proxy, key_len as usize)
            .map_err(|err| AmberError::corruption(format!("bad table entry: {}", err)))?;
        let (key, version, value) = entry;
        db.put(&key, version, value)?;
    }

    let computed = proxy.into_inner().checksum();
    if computed != stored_checksum {
        return Err(AmberError::corruption(format!(
            "crc32 checksum fail {} vs {}",
            stored_checksum, computed
        )));
    }
    Ok(())
}

fn read_entry<R: Read>(
    reader: &mut SerializedReader<R>,
    key_len: usize,
) -> io::Result<(Vec<u8>, u64, ValueHandle)> {
    let key = reader.read_raw(key_len)?;
    let _entry_type = reader.read_byte()?;
    let version = reader.read_varint64()?;
    let value = deserialize_value(reader)?;
    Ok((key, version, value))
}
