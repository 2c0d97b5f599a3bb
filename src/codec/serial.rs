// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! Length-prefixed stream I/O.
//!
//! `SerializedWriter` and `SerializedReader` wrap any `Write`/`Read` and
//! speak the varint vocabulary of the WAL, the table files, and the binary
//! wire protocol. The CRC proxies accumulate a crc32 over everything that
//! passes through them; the table codec streams its entries through one and
//! patches the checksum into the file header afterwards.
//!
//! Errors stay at the `std::io` layer here. Callers decide what an
//! unexpected end of input means: the WAL reader treats it as a clean end
//! only between records, the table loader treats it as corruption, and the
//! client session treats it as an incomplete frame.

use crate::codec::varint;
use std::io::{self, Read, Write};

/// Writer for varint-framed records.
pub struct SerializedWriter<W: Write> {
    inner: W,
}

impl<W: Write> SerializedWriter<W> {
    pub fn new(inner: W) -> SerializedWriter<W> {
        SerializedWriter { inner }
    }

    /// Returns the wrapped stream.
    pub fn into_inner(self) -> W {
        self.inner
    }

    pub fn get_mut(&mut self) -> &mut W {
        &mut self.inner
    }

    /// Writes one raw byte, returning the byte count (1).
    pub fn write_byte(&mut self, byte: u8) -> io::Result<usize> {
        self.inner.write_all(&[byte])?;
        Ok(1)
    }

    /// Writes a u32 varint, returning the encoded length.
    pub fn write_varint32(&mut self, value: u32) -> io::Result<usize> {
        let mut buf = [0u8; varint::MAX32_LEN];
        let n = varint::encode32(value, &mut buf);
        self.inner.write_all(&buf[..n])?;
        Ok(n)
    }

    /// Writes a u64 varint, returning the encoded length.
    pub fn write_varint64(&mut self, value: u64) -> io::Result<usize> {
        let mut buf = [0u8; varint::MAX64_LEN];
        let n = varint::encode64(value, &mut buf);
        self.inner.write_all(&buf[..n])?;
        Ok(n)
    }

    /// Writes an i64 as a zigzag varint, returning the encoded length.
    pub fn write_svarint64(&mut self, value: i64) -> io::Result<usize> {
        self.write_varint64(varint::zigzag64(value))
    }

    /// Writes a length-prefixed byte slice (varint64 length, then bytes).
    pub fn write_slice(&mut self, bytes: &[u8]) -> io::Result<usize> {
        let n = self.write_varint64(bytes.len() as u64)?;
        self.inner.write_all(bytes)?;
        Ok(n + bytes.len())
    }

    /// Writes raw bytes with no prefix.
    pub fn write_raw(&mut self, bytes: &[u8]) -> io::Result<usize> {
        self.inner.write_all(bytes)?;
        Ok(bytes.len())
    }

    /// Writes a little-endian fixed u32.
    pub fn write_fixed32(&mut self, value: u32) -> io::Result<usize> {
        self.inner.write_all(&value.to_le_bytes())?;
        Ok(4)
    }
}

/// Reader for varint-framed records.
pub struct SerializedReader<R: Read> {
    inner: R,
}

fn overlong(kind: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, format!("{} too large", kind))
}

impl<R: Read> SerializedReader<R> {
    pub fn new(inner: R) -> SerializedReader<R> {
        SerializedReader { inner }
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    pub fn get_mut(&mut self) -> &mut R {
        &mut self.inner
    }

    /// Reads one byte; `UnexpectedEof` when the stream ends.
    pub fn read_byte(&mut self) -> io::Result<u8> {
        let mut buf = [0u8; 1];
        self.inner.read_exact(&mut buf)?;
        Ok(buf[0])
    }

    /// Reads a u32 varint; `InvalidData` on an overlong encoding.
    pub fn read_varint32(&mut self) -> io::Result<u32> {
        let mut value: u64 = 0;
        for i in 0..varint::MAX32_LEN {
            let byte = self.read_byte()?;
            value |= u64::from(byte & 0x7f) << (7 * i);
            if byte < 0x80 {
                if value > u64::from(u32::MAX) {
                    return Err(overlong("varint32"));
                }
                return Ok(value as u32);
            }
        }
        Err(overlong("varint32"))
    }

    /// Reads a u64 varint; `InvalidData` on an overlong encoding.
    pub fn read_varint64(&mut self) -> io::Result<u64> {
        let mut value: u64 = 0;
        for i in 0..varint::MAX64_LEN {
            let byte = self.read_byte()?;
            value |= u64::from(byte & 0x7f) << (7 * i);
            if byte < 0x80 {
                return Ok(value);
            }
        }
        Err(overlong("varint64"))
    }

    /// Reads a zigzag varint as i64.
    pub fn read_svarint64(&mut self) -> io::Result<i64> {
        Ok(varint::unzigzag64(self.read_varint64()?))
    }

    /// Reads a length-prefixed byte vector (varint64 length, then bytes).
    ///
    /// `limit` bounds the declared length; a prefix above it is rejected as
    /// `InvalidData` rather than allocated.
    pub fn read_slice(&mut self, limit: usize) -> io::Result<Vec<u8>> {
        let len = self.read_varint64()?;
        if len > limit as u64 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("length prefix {} exceeds limit {}", len, limit),
            ));
        }
        let mut buf = vec![0u8; len as usize];
        self.inner.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// Reads exactly `n` raw bytes.
    pub fn read_raw(&mut self, n: usize) -> io::Result<Vec<u8>> {
        let mut buf = vec![0u8; n];
        self.inner.read_exact(&mut buf)?;
        Ok(buf)
    }
}

/// Write proxy accumulating a crc32 over everything written through it.
pub struct CrcWriter<W: Write> {
    inner: W,
    hasher: crc32fast::Hasher,
}

impl<W: Write> CrcWriter<W> {
    pub fn new(inner: W) -> CrcWriter<W> {
        CrcWriter {
            inner,
            hasher: crc32fast::Hasher::new(),
        }
    }

    /// Final checksum over all bytes written so far.
    pub fn checksum(&self) -> u32 {
        self.hasher.clone().finalize()
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for CrcWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Read proxy accumulating a crc32 over everything read through it.
pub struct CrcReader<R: Read> {
    inner: R,
    hasher: crc32fast::Hasher,
}

impl<R: Read> CrcReader<R> {
    pub fn new(inner: R) -> CrcReader<R> {
        CrcReader {
            inner,
            hasher: crc32fast::Hasher::new(),
        }
    }

    /// Final checksum over all bytes read so far.
    pub fn checksum(&self) -> u32 {
        self.hasher.clone().finalize()
    }
}

impl<R: Read> Read for CrcReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.hasher.update(&buf[..n]);
        Ok(n)
    }
}
