// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! Write-ahead log framing.
//!
//! One record per mutating command:
//!
//! ```text
//! [cmd code (u8)][version (zigzag-varint64)][argc (varint32)][arg ...]
//! ```
//!
//! where each argument is a serialized value. A record is staged in memory
//! and handed to the file in one logical write; the caller enqueues the
//! fsync with the background worker after `append` returns. The reader
//! yields records until a clean end of stream; a record that ends
//! mid-frame is corruption and the caller decides whether to stop replay.

use crate::codec::serial::{SerializedReader, SerializedWriter};
use crate::error::{AmberError, AmberResult};
use crate::value::obj::{deserialize_value, serialize_value, ValueHandle};
use std::io::{self, Read, Write};

/// One decoded WAL record.
pub struct LoggedOp {
    pub code: u8,
    pub version: i64,
    pub args: Vec<ValueHandle>,
}

/// Appends framed records to a stream, counting bytes for the checkpoint
/// threshold.
pub struct BinLogWriter<W: Write> {
    stream: W,
    written_bytes: u64,
}

impl<W: Write> BinLogWriter<W> {
    pub fn new(stream: W) -> BinLogWriter<W> {
        BinLogWriter {
            stream,
            written_bytes: 0,
        }
    }

    /// Resumes on an existing log, seeding the byte counter with its
    /// current length so the checkpoint threshold keeps working.
    pub fn resume(stream: W, written_bytes: u64) -> BinLogWriter<W> {
        BinLogWriter {
            stream,
            written_bytes,
        }
    }

    /// Appends one record, returning the number of bytes written.
    pub fn append(&mut self, code: u8, version: i64, args: &[ValueHandle]) -> io::Result<usize> {
        let mut record = SerializedWriter::new(Vec::new());
        record.write_byte(code)?;
        record.write_svarint64(version)?;
        record.write_varint32(args.len() as u32)?;
        for arg in args {
            serialize_value(arg, &mut record)?;
        }

        let buf = record.into_inner();
        self.stream.write_all(&buf)?;
        self.written_bytes += buf.len() as u64;
        Ok(buf.len())
    }

    /// Bytes appended since construction or the last [`reset`].
    ///
    /// [`reset`]: BinLogWriter::reset
    pub fn written_bytes(&self) -> u64 {
        self.written_bytes
    }

    /// Swaps in a fresh stream (log rotation), returning the old one and
    /// zeroing the byte counter.
    pub fn reset(&mut self, stream: W) -> W {
        self.written_bytes = 0;
        std::mem::replace(&mut self.stream, stream)
    }

    pub fn stream(&self) -> &W {
        &self.stream
    }
}

/// Sequential WAL record reader.
pub struct BinLogReader<R: Read> {
    stream: SerializedReader<R>,
}

impl<R: Read> BinLogReader<R> {
    pub fn new(stream: R) -> BinLogReader<R> {
        BinLogReader {
            stream: SerializedReader::new(stream),
        }
    }

    /// Reads the next record.
    ///
    /// ## Output
    /// - `Ok(Some(op))`: one decoded record
    /// - `Ok(None)`: clean end of stream at a record boundary
    /// - `Err(Corruption)`: the stream ends or turns invalid mid-record
    pub fn read(&mut self) -> AmberResult<Option<LoggedOp>> {
        let code = match self.stream.read_byte() {
            Ok(code) => code,
            Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(err) => return Err(AmberError::io("read_log", err)),
        };

        let version = self
            .stream
            .read_svarint64()
            .map_err(|err| AmberError::corruption(format!("bad log record version: {}", err)))?;
        let argc = self
            .stream
            .read_varint32()
            .map_err(|err| AmberError::corruption(format!("bad log record argc: {}", err)))?;

        let mut args = Vec::with_capacity(argc as usize);
        for _ in 0..argc {
            let arg = deserialize_value(&mut self.stream)
                .map_err(|err| AmberError::corruption(format!("bad log record arg: {}", err)))?;
            args.push(arg);
        }

        Ok(Some(LoggedOp {
            code,
            version,
            args,
        }))
    }
}
