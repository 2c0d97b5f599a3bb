// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! Circular byte buffer.
//!
//! Fixed-capacity staging buffer between a client socket and the frame
//! parser, owned by a single session and not thread-safe. Reads hand out
//! the largest contiguous writable span so the socket can be drained with
//! plain `read` calls; the parser consumes either a zero-copy slice into
//! the ring or, when the region wraps, a copy assembled in a caller stub.
//! A parser that finds an incomplete frame rewinds its consumption.
//!
//! Positions are monotonically increasing totals; the in-buffer offset is
//! always `total % capacity`.

/// Single-owner circular byte buffer.
pub struct CircularBuffer {
    buf: Box<[u8]>,
    rd_pos: usize,
    wr_pos: usize,
    rd_total: u64,
    wr_total: u64,
}

impl CircularBuffer {
    pub fn new(capacity: usize) -> CircularBuffer {
        assert!(capacity > 0, "circular buffer needs capacity");
        CircularBuffer {
            buf: vec![0u8; capacity].into_boxed_slice(),
            rd_pos: 0,
            wr_pos: 0,
            rd_total: 0,
            wr_total: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Unread byte count.
    pub fn read_remain(&self) -> usize {
        (self.wr_total - self.rd_total) as usize
    }

    /// Free byte count.
    pub fn write_remain(&self) -> usize {
        self.capacity() - self.read_remain()
    }

    fn write_once_remain(&self) -> usize {
        let remain = self.write_remain();
        if remain == 0 {
            return 0;
        }
        if self.rd_pos <= self.wr_pos {
            self.capacity() - self.wr_pos
        } else {
            self.rd_pos - self.wr_pos
        }
    }

    fn read_once_remain(&self) -> usize {
        let remain = self.read_remain();
        if remain == 0 {
            return 0;
        }
        if self.rd_pos < self.wr_pos {
            self.wr_pos - self.rd_pos
        } else {
            self.capacity() - self.rd_pos
        }
    }

    /// The largest contiguous writable span, at most `need` bytes long;
    /// empty when the buffer is full. Commit what was filled with
    /// [`advance`].
    ///
    /// [`advance`]: CircularBuffer::advance
    pub fn once_write_buffer(&mut self, need: usize) -> &mut [u8] {
        let len = need.min(self.write_once_remain());
        &mut self.buf[self.wr_pos..self.wr_pos + len]
    }

    /// Commits `n` bytes written into the span from [`once_write_buffer`].
    ///
    /// [`once_write_buffer`]: CircularBuffer::once_write_buffer
    pub fn advance(&mut self, n: usize) {
        debug_assert!(n <= self.write_once_remain());
        self.wr_total += n as u64;
        self.wr_pos = (self.wr_total % self.capacity() as u64) as usize;
    }

    /// Copy-in write; returns the byte count accepted, `None` when the
    /// input exceeds the capacity or the buffer is full.
    pub fn copied_write(&mut self, input: &[u8]) -> Option<usize> {
        if input.len() > self.capacity() {
            return None;
        }
        let need = input.len().min(self.write_remain());
        if need == 0 {
            return None;
        }

        let once = self.write_once_remain();
        if need <= once {
            self.buf[self.wr_pos..self.wr_pos + need].copy_from_slice(&input[..need]);
        } else {
            self.buf[self.wr_pos..self.wr_pos + once].copy_from_slice(&input[..once]);
            self.buf[..need - once].copy_from_slice(&input[once..need]);
        }
        self.wr_total += need as u64;
        self.wr_pos = (self.wr_total % self.capacity() as u64) as usize;
        Some(need)
    }

    /// Consumes up to `need` readable bytes.
    ///
    /// ## Output
    /// - a zero-copy slice into the ring when the region is contiguous
    /// - otherwise a copy assembled in `stub`
    /// - `None` when nothing is readable
    ///
    /// The bytes count as consumed; [`rewind`] returns them when the
    /// parser finds an incomplete frame.
    ///
    /// [`rewind`]: CircularBuffer::rewind
    pub fn copied_read_if_need<'a>(
        &'a mut self,
        need: usize,
        stub: &'a mut Vec<u8>,
    ) -> Option<&'a [u8]> {
        let need = need.min(self.read_remain());
        if need == 0 {
            return None;
        }

        let once = self.read_once_remain();
        let start = self.rd_pos;
        self.rd_total += need as u64;
        self.rd_pos = (self.rd_total % self.capacity() as u64) as usize;

        if need <= once {
            Some(&self.buf[start..start + need])
        } else {
            stub.clear();
            stub.extend_from_slice(&self.buf[start..start + once]);
            stub.extend_from_slice(&self.buf[..need - once]);
            Some(stub.as_slice())
        }
    }

    /// Returns `n` bytes of consumption.
    pub fn rewind(&mut self, n: usize) {
        debug_assert!(n as u64 <= self.rd_total);
        self.rd_total -= n as u64;
        self.rd_pos = (self.rd_total % self.capacity() as u64) as usize;
    }
}
