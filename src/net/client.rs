// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! Client session.
//!
//! One session per accepted socket, owned by exactly one worker and never
//! touched concurrently. A session stages socket reads in its circular
//! buffer, frames commands in the negotiated protocol, dispatches them
//! against the selected database, and buffers replies until the socket
//! drains them.
//!
//! ## State machine
//!
//! - `INIT`: wait for the 5-byte protocol greeting `TXT\r\n` or
//!   `BIN\r\n`, reply `ok`; then `AUTH` when the server requires
//!   authentication, `PROC` otherwise
//! - `AUTH`: only `AUTH <password>` is accepted; a wrong digest sleeps
//!   one second, replies an error, and parks the session in `AUTH_FAIL`
//! - `PROC`: command dispatch
//! - `AUTH_FAIL`: terminal, the connection closes once the error reply
//!   has drained
//!
//! Mutating commands append their WAL record before touching the map; a
//! failed append surfaces as an error reply and leaves memory untouched.

use crate::codec::serial::SerializedReader;
use crate::codec::varint;
use crate::command::{self, CmdCode, Command};
use crate::db::Db;
use crate::error::{AmberError, AmberResult};
use crate::net::ring::CircularBuffer;
use crate::net::server::{current_ms, ServerContext};
use crate::sync::list::LockFreeList;
use crate::value::obj::{deserialize_value, Value, ValueHandle};
use log::{debug, info};
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::os::unix::io::{IntoRawFd, RawFd};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Per-session staging buffer capacity.
pub const IO_BUF_SIZE: usize = 5 * 1024;

/// Upper bound on a binary frame's declared argument count.
const MAX_BINARY_ARGC: usize = 1 << 20;

// Binary reply tags.
const BIN_NIL: u8 = 0;
const BIN_ERROR: u8 = 1;
const BIN_ARRAY: u8 = 2;
const BIN_STRING: u8 = 3;
const BIN_INTEGER: u8 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Init,
    Auth,
    Proc,
    AuthFail,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Protocol {
    Text,
    Binary,
}

/// One connected client.
pub struct Client {
    stream: TcpStream,
    addr: SocketAddr,
    ctx: Arc<ServerContext>,
    state: State,
    protocol: Protocol,
    input: CircularBuffer,
    output: Vec<u8>,
    output_written: usize,
    db_index: usize,
    closing: bool,
}

impl Client {
    pub fn new(stream: TcpStream, addr: SocketAddr, ctx: Arc<ServerContext>) -> Client {
        Client {
            stream,
            addr,
            ctx,
            state: State::Init,
            protocol: Protocol::Text,
            input: CircularBuffer::new(IO_BUF_SIZE),
            output: Vec::new(),
            output_written: 0,
            db_index: 0,
            closing: false,
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// True while buffered replies are waiting for the socket.
    pub fn wants_write(&self) -> bool {
        self.output_written < self.output.len()
    }

    /// True once the session is done and its replies have drained.
    pub fn should_close(&self) -> bool {
        self.closing && !self.wants_write()
    }

    /// Surrenders the socket without closing it; the worker hands the
    /// descriptor to the background worker for the actual close.
    pub fn into_fd(self) -> RawFd {
        self.stream.into_raw_fd()
    }

    /// Drains the socket into the staging buffer and processes whatever
    /// frames completed.
    pub fn on_readable(&mut self) -> AmberResult<()> {
        loop {
            let span = self.input.once_write_buffer(IO_BUF_SIZE);
            if span.is_empty() {
                break;
            }
            let span_len = span.len();
            match self.stream.read(span) {
                Ok(0) => {
                    return Err(AmberError::io(
                        "read_client",
                        io::Error::new(io::ErrorKind::UnexpectedEof, "connection lost"),
                    ))
                }
                Ok(n) => {
                    self.input.advance(n);
                    if n < span_len {
                        break;
                    }
                }
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => break,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(AmberError::io("read_client", err)),
            }
        }

        self.process_input();
        Ok(())
    }

    /// Flushes buffered replies; the worker drops write interest once the
    /// buffer is empty.
    pub fn on_writable(&mut self) -> AmberResult<()> {
        while self.output_written < self.output.len() {
            match self.stream.write(&self.output[self.output_written..]) {
                Ok(0) => {
                    return Err(AmberError::io(
                        "write_client",
                        io::Error::new(io::ErrorKind::WriteZero, "connection lost"),
                    ))
                }
                Ok(n) => self.output_written += n,
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(AmberError::io("write_client", err)),
            }
        }
        self.output.clear();
        self.output_written = 0;
        Ok(())
    }

    fn process_input(&mut self) {
        if self.state == State::Init {
            self.handle_init();
        }
        if matches!(self.state, State::Auth | State::Proc) {
            self.process_frames();
        }
    }

    fn handle_init(&mut self) {
        if self.input.read_remain() < 5 {
            return;
        }
        let mut stub = Vec::new();
        let head = self
            .input
            .copied_read_if_need(5, &mut stub)
            .map(|bytes| bytes.to_vec())
            .unwrap_or_default();

        match head.as_slice() {
            b"TXT\r\n" => {
                self.protocol = Protocol::Text;
                info!("client {} text protocol setup", self.addr);
            }
            b"BIN\r\n" => {
                self.protocol = Protocol::Binary;
                info!("client {} binary protocol setup", self.addr);
            }
            _ => {
                self.add_error_reply("bad protocol setting. (TXT/BIN)");
                self.closing = true;
                return;
            }
        }
        self.state = if self.ctx.auth_required {
            State::Auth
        } else {
            State::Proc
        };
        self.add_string_reply(b"ok");
    }

    fn process_frames(&mut self) {
        loop {
            if self.closing {
                return;
            }

            let mut stub = Vec::new();
            let step = {
                match self.input.copied_read_if_need(IO_BUF_SIZE, &mut stub) {
                    None => Step::Drained,
                    Some(input) => match self.protocol {
                        Protocol::Text => match parse_text_frame(input) {
                            TextParse::Incomplete => Step::Incomplete(input.len()),
                            TextParse::Frame { tokens, consumed } => {
                                Step::Text(tokens, consumed, input.len())
                            }
                        },
                        Protocol::Binary => match parse_binary_frame(input) {
                            BinaryParse::Incomplete => Step::Incomplete(input.len()),
                            BinaryParse::Malformed(reason) => Step::Malformed(reason),
                            BinaryParse::Frame {
                                code,
                                args,
                                consumed,
                            } => Step::Binary(code, args, consumed, input.len()),
                        },
                    },
                }
            };

            match step {
                Step::Drained => return,
                Step::Incomplete(taken) => {
                    self.input.rewind(taken);
                    if taken == self.input.capacity() {
                        self.add_error_reply("frame exceeds buffer capacity");
                        self.closing = true;
                    }
                    return;
                }
                Step::Malformed(reason) => {
                    self.add_error_reply(&format!("bad frame: {}", reason));
                    self.closing = true;
                    return;
                }
                Step::Text(tokens, consumed, taken) => {
                    self.input.rewind(taken - consumed);
                    self.dispatch_text(tokens);
                }
                Step::Binary(code, args, consumed, taken) => {
                    self.input.rewind(taken - consumed);
                    self.dispatch_binary(code, args);
                }
            }
        }
    }

    fn dispatch_text(&mut self, tokens: Vec<Vec<u8>>) {
        let Some(name) = tokens.first() else {
            return; // blank line
        };
        let Some(cmd) = command::lookup(name) else {
            self.add_error_reply(&format!(
                "Command {} not support.",
                String::from_utf8_lossy(name)
            ));
            return;
        };
        let args: Vec<ValueHandle> = tokens[1..]
            .iter()
            .map(|token| Value::string(token.clone()))
            .collect();
        self.process_command(cmd, args);
    }

    fn dispatch_binary(&mut self, code: u8, args: Vec<ValueHandle>) {
        let Some(cmd) = command::by_code(code) else {
            self.add_error_reply(&format!("Command code {} not support.", code));
            return;
        };
        self.process_command(cmd, args);
    }

    fn process_command(&mut self, cmd: &'static Command, args: Vec<ValueHandle>) {
        if args.len() < cmd.min_argc {
            self.add_error_reply(&format!(
                "{} bad arguments number, expect {}, actual {}.",
                cmd.name,
                cmd.min_argc,
                args.len()
            ));
            return;
        }
        if self.state == State::Auth && cmd.code != CmdCode::Auth {
            self.add_error_reply("authentication required");
            return;
        }

        debug!("client {} command {}", self.addr, cmd.name);
        match cmd.code {
            CmdCode::Auth => self.cmd_auth(&args),
            CmdCode::Select => self.cmd_select(&args),
            CmdCode::Dump => self.cmd_dump(&args),
            CmdCode::Get => self.cmd_get(&args),
            CmdCode::Set => self.cmd_set(&args),
            CmdCode::Del => self.cmd_del(&args),
            CmdCode::Keys => self.cmd_keys(&args),
            CmdCode::List => self.cmd_list(&args),
            CmdCode::LPush | CmdCode::RPush => self.cmd_push(cmd, &args),
            CmdCode::LPop | CmdCode::RPop => self.cmd_pop(cmd, &args),
            CmdCode::LLen => self.cmd_llen(&args),
        }
    }

    fn selected_db(&mut self) -> Option<Arc<dyn Db>> {
        match self.ctx.dbs.get(self.db_index) {
            Some(db) => Some(Arc::clone(db)),
            None => {
                self.add_error_reply("no database configured");
                None
            }
        }
    }

    fn key_of<'a>(&mut self, args: &'a [ValueHandle]) -> Option<&'a [u8]> {
        match args[0].as_bytes() {
            Some(key) => Some(key),
            None => {
                self.add_error_reply("Bad key type, expect string.");
                None
            }
        }
    }

    fn cmd_auth(&mut self, args: &[ValueHandle]) {
        let Some(password) = args[0].as_bytes() else {
            self.add_error_reply("Bad password type, expect string.");
            return;
        };
        if !self.ctx.auth_required {
            self.add_string_reply(b"ok");
            return;
        }

        let mut salted = password.to_vec();
        salted.push(b'\n');
        let digest = hex::encode(md5::compute(&salted).0);
        if digest.eq_ignore_ascii_case(&self.ctx.pass_digest) {
            self.state = State::Proc;
            self.add_string_reply(b"ok");
        } else {
            // Flat penalty against digest guessing.
            thread::sleep(Duration::from_secs(1));
            info!("client {} authentication failed", self.addr);
            self.add_error_reply("authentication failed");
            self.state = State::AuthFail;
            self.closing = true;
        }
    }

    fn cmd_select(&mut self, args: &[ValueHandle]) {
        let Some(index) = args[0].as_int() else {
            self.add_error_reply("Bad type, expect integer.");
            return;
        };
        if index < 0 || index as usize >= self.ctx.dbs.len() {
            self.add_error_reply(&format!("db id {} out of range", index));
            return;
        }
        self.db_index = index as usize;
        self.add_string_reply(b"ok");
    }

    fn cmd_dump(&mut self, args: &[ValueHandle]) {
        // No argument means forced; an explicit 0 means not forced.
        let force = match args.first() {
            None => true,
            Some(arg) => match arg.as_int() {
                Some(n) => n != 0,
                None => {
                    self.add_error_reply("Bad type, expect integer.");
                    return;
                }
            },
        };
        let Some(db) = self.selected_db() else { return };
        match db.checkpoint(force) {
            Ok(()) => self.add_string_reply(b"ok"),
            Err(err) => self.add_error_reply(&err.to_string()),
        }
    }

    fn cmd_get(&mut self, args: &[ValueHandle]) {
        let Some(db) = self.selected_db() else { return };
        let Some(key) = self.key_of(args) else { return };
        match db.get(key) {
            Ok((_, value)) => match &*value {
                Value::String(_) | Value::Integer(_) => self.add_value_reply(&value),
                other => self.add_error_reply(&format!("GET on a {} value", other.type_name())),
            },
            Err(AmberError::NotFound) => self.add_nil_reply(),
            Err(err) => self.add_error_reply(&err.to_string()),
        }
    }

    fn cmd_set(&mut self, args: &[ValueHandle]) {
        let Some(db) = self.selected_db() else { return };
        let Some(key) = self.key_of(args) else { return };
        let version = current_ms();
        if let Err(err) = db.append_log(CmdCode::Set, version, args) {
            self.add_error_reply(&err.to_string());
            return;
        }
        match db.put(key, version as u64, args[1].clone()) {
            Ok(()) => self.add_string_reply(b"ok"),
            Err(err) => self.add_error_reply(&err.to_string()),
        }
    }

    fn cmd_del(&mut self, args: &[ValueHandle]) {
        let Some(db) = self.selected_db() else { return };
        let Some(key) = self.key_of(args) else { return };
        if let Err(err) = db.append_log(CmdCode::Del, 0, args) {
            self.add_error_reply(&err.to_string());
            return;
        }
        let removed = db.delete(key);
        self.add_integer_reply(i64::from(removed));
    }

    fn cmd_keys(&mut self, args: &[ValueHandle]) {
        let limit = match args.first() {
            None => usize::MAX,
            Some(arg) => match arg.as_int() {
                Some(n) if n >= 0 => n as usize,
                _ => {
                    self.add_error_reply("Bad type, expect non-negative integer.");
                    return;
                }
            },
        };
        let Some(db) = self.selected_db() else { return };

        let mut keys: Vec<Vec<u8>> = Vec::new();
        let walked = db.snapshot(&mut |boundle, _| {
            if keys.len() < limit {
                keys.push(boundle.key().to_vec());
            }
            Ok(())
        });
        if let Err(err) = walked {
            self.add_error_reply(&err.to_string());
            return;
        }

        self.add_array_head(keys.len());
        for key in keys {
            self.add_string_reply(&key);
        }
    }

    fn cmd_list(&mut self, args: &[ValueHandle]) {
        let Some(db) = self.selected_db() else { return };
        let Some(key) = self.key_of(args) else { return };
        let version = current_ms();
        if let Err(err) = db.append_log(CmdCode::List, version, args) {
            self.add_error_reply(&err.to_string());
            return;
        }

        let list = LockFreeList::new();
        for element in &args[1..] {
            list.push_back(element.clone());
        }
        match db.put(key, version as u64, Arc::new(Value::List(list))) {
            Ok(()) => self.add_string_reply(b"ok"),
            Err(err) => self.add_error_reply(&err.to_string()),
        }
    }

    fn cmd_push(&mut self, cmd: &'static Command, args: &[ValueHandle]) {
        let Some(db) = self.selected_db() else { return };
        let Some(key) = self.key_of(args) else { return };
        if !self.expect_list(db.as_ref(), cmd, key) {
            return;
        }
        if let Err(err) = db.append_log(cmd.code, 0, args) {
            self.add_error_reply(&err.to_string());
            return;
        }

        let _ = db.exec(key, &mut |_, value| {
            if let Value::List(list) = &**value {
                for element in &args[1..] {
                    if cmd.code == CmdCode::LPush {
                        list.push_front(element.clone());
                    } else {
                        list.push_back(element.clone());
                    }
                }
            }
        });
        self.add_string_reply(b"ok");
    }

    fn cmd_pop(&mut self, cmd: &'static Command, args: &[ValueHandle]) {
        let Some(db) = self.selected_db() else { return };
        let Some(key) = self.key_of(args) else { return };
        if !self.expect_list(db.as_ref(), cmd, key) {
            return;
        }
        if let Err(err) = db.append_log(cmd.code, 0, args) {
            self.add_error_reply(&err.to_string());
            return;
        }

        let mut popped: Option<ValueHandle> = None;
        let _ = db.exec_mut(key, &mut |_, value| {
            if let Value::List(list) = &**value {
                popped = if cmd.code == CmdCode::LPop {
                    list.pop_front()
                } else {
                    list.pop_back()
                };
            }
        });
        match popped {
            Some(value) => self.add_value_reply(&value),
            None => self.add_nil_reply(),
        }
    }

    fn cmd_llen(&mut self, args: &[ValueHandle]) {
        let Some(db) = self.selected_db() else { return };
        let Some(key) = self.key_of(args) else { return };

        let mut length: Option<usize> = None;
        match db.exec(key, &mut |_, value| {
            if let Value::List(list) = &**value {
                length = Some(list.len());
            }
        }) {
            Err(AmberError::NotFound) => self.add_integer_reply(0),
            Err(err) => self.add_error_reply(&err.to_string()),
            Ok(()) => match length {
                Some(len) => self.add_integer_reply(len as i64),
                None => self.add_error_reply("LLEN: not a list"),
            },
        }
    }

    /// Verifies the key holds a list, replying the error otherwise.
    fn expect_list(&mut self, db: &dyn Db, cmd: &'static Command, key: &[u8]) -> bool {
        let mut is_list = false;
        match db.exec(key, &mut |_, value| {
            is_list = matches!(&**value, Value::List(_));
        }) {
            Err(AmberError::NotFound) => {
                self.add_error_reply(&format!(
                    "{}: list {} not exist",
                    cmd.name,
                    String::from_utf8_lossy(key)
                ));
                false
            }
            Err(err) => {
                self.add_error_reply(&err.to_string());
                false
            }
            Ok(()) if !is_list => {
                self.add_error_reply(&format!("{}: not a list", cmd.name));
                false
            }
            Ok(()) => true,
        }
    }

    // ----- replies -------------------------------------------------------

    fn add_string_reply(&mut self, bytes: &[u8]) {
        match self.protocol {
            Protocol::Text => {
                self.output
                    .extend_from_slice(format!("${}\r\n", bytes.len()).as_bytes());
                self.output.extend_from_slice(bytes);
                self.output.extend_from_slice(b"\r\n");
            }
            Protocol::Binary => {
                self.output.push(BIN_STRING);
                push_varint64(&mut self.output, bytes.len() as u64);
                self.output.extend_from_slice(bytes);
            }
        }
    }

    fn add_integer_reply(&mut self, value: i64) {
        match self.protocol {
            Protocol::Text => {
                self.output
                    .extend_from_slice(format!(":{}\r\n", value).as_bytes());
            }
            Protocol::Binary => {
                self.output.push(BIN_INTEGER);
                push_varint64(&mut self.output, varint::zigzag64(value));
            }
        }
    }

    fn add_error_reply(&mut self, message: &str) {
        match self.protocol {
            Protocol::Text => {
                self.output.push(b'-');
                self.output
                    .extend_from_slice(message.replace(['\r', '\n'], " ").as_bytes());
                self.output.extend_from_slice(b"\r\n");
            }
            Protocol::Binary => {
                self.output.push(BIN_ERROR);
                push_varint64(&mut self.output, message.len() as u64);
                self.output.extend_from_slice(message.as_bytes());
            }
        }
    }

    fn add_nil_reply(&mut self) {
        match self.protocol {
            Protocol::Text => self.output.extend_from_slice(b"$-1\r\n"),
            Protocol::Binary => self.output.push(BIN_NIL),
        }
    }

    fn add_array_head(&mut self, len: usize) {
        match self.protocol {
            Protocol::Text => {
                self.output
                    .extend_from_slice(format!("*{}\r\n", len).as_bytes());
            }
            Protocol::Binary => {
                self.output.push(BIN_ARRAY);
                push_varint32(&mut self.output, len as u32);
            }
        }
    }

    fn add_value_reply(&mut self, value: &Value) {
        match value {
            Value::String(bytes) => self.add_string_reply(bytes),
            Value::Integer(v) => self.add_integer_reply(*v),
            Value::List(list) => {
                let items: Vec<ValueHandle> = list.iter().cloned().collect();
                self.add_array_head(items.len());
                for item in items {
                    self.add_value_reply(&item);
                }
            }
            Value::Hash(map) => {
                let mut pairs = Vec::new();
                let mut iter = map.iter();
                iter.seek_to_first();
                while iter.valid() {
                    pairs.push((iter.key().key().to_vec(), iter.value().clone()));
                    iter.next();
                }
                self.add_array_head(pairs.len());
                for (key, item) in pairs {
                    self.add_array_head(2);
                    self.add_string_reply(&key);
                    self.add_value_reply(&item);
                }
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn test_output(&self) -> &[u8] {
        &self.output[self.output_written..]
    }

    #[cfg(test)]
    pub(crate) fn test_take_output(&mut self) -> Vec<u8> {
        let out = self.output[self.output_written..].to_vec();
        self.output.clear();
        self.output_written = 0;
        out
    }

    #[cfg(test)]
    pub(crate) fn test_closing(&self) -> bool {
        self.closing
    }
}

enum Step {
    Drained,
    Incomplete(usize),
    Malformed(String),
    Text(Vec<Vec<u8>>, usize, usize),
    Binary(u8, Vec<ValueHandle>, usize, usize),
}

pub(crate) enum TextParse {
    Incomplete,
    Frame {
        tokens: Vec<Vec<u8>>,
        consumed: usize,
    },
}

/// Frames one `<CMD> <arg>...\r\n` line; arguments are split on spaces
/// with repeats collapsed.
pub(crate) fn parse_text_frame(buf: &[u8]) -> TextParse {
    let Some(end) = buf.windows(2).position(|window| window == b"\r\n") else {
        return TextParse::Incomplete;
    };
    let tokens = buf[..end]
        .split(|&byte| byte == b' ')
        .filter(|token| !token.is_empty())
        .map(|token| token.to_vec())
        .collect();
    TextParse::Frame {
        tokens,
        consumed: end + 2,
    }
}

pub(crate) enum BinaryParse {
    Incomplete,
    Malformed(String),
    Frame {
        code: u8,
        args: Vec<ValueHandle>,
        consumed: usize,
    },
}

/// Frames one `[cmd][flags][argc][arg ...]` binary record.
pub(crate) fn parse_binary_frame(buf: &[u8]) -> BinaryParse {
    let mut cursor = io::Cursor::new(buf);
    match parse_binary_inner(&mut cursor) {
        Ok((code, args)) => BinaryParse::Frame {
            code,
            args,
            consumed: cursor.position() as usize,
        },
        Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => BinaryParse::Incomplete,
        Err(err) => BinaryParse::Malformed(err.to_string()),
    }
}

fn parse_binary_inner(cursor: &mut io::Cursor<&[u8]>) -> io::Result<(u8, Vec<ValueHandle>)> {
    let mut reader = SerializedReader::new(cursor);
    let code = reader.read_byte()?;
    let _flags = reader.read_byte()?;
    let argc = reader.read_varint32()? as usize;
    if argc > MAX_BINARY_ARGC {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("argc {} exceeds limit", argc),
        ));
    }
    let mut args = Vec::with_capacity(argc);
    for _ in 0..argc {
        args.push(deserialize_value(&mut reader)?);
    }
    Ok((code, args))
}

fn push_varint32(out: &mut Vec<u8>, value: u32) {
    let mut scratch = [0u8; varint::MAX32_LEN];
    let n = varint::encode32(value, &mut scratch);
    out.extend_from_slice(&scratch[..n]);
}

fn push_varint64(out: &mut Vec<u8>, value: u64) {
    let mut scratch = [0u8; varint::MAX64_LEN];
    let n = varint::encode64(value, &mut scratch);
    out.extend_from_slice(&scratch[..n]);
}
