// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! The command table.
//!
//! One static, read-only table describing every command the server speaks:
//! wire code (shared by the binary protocol and the WAL), canonical name
//! for the text protocol, and the minimum argument count enforced before
//! dispatch. Lookup by name is case-insensitive.

use once_cell::sync::Lazy;
use std::collections::HashMap;


/// Wire code of a command, stable across the binary protocol and the WAL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CmdCode {
    Auth = 0,
    Select = 1,
    Dump = 2,
    Get = 3,
    Set = 4,
    Del = 5,
    Keys = 6,
    List = 7,
    LPush = 8,
    RPush = 9,
    LPop = 10,
    RPop = 11,
    LLen = 12,
}

impl CmdCode {
    pub fn from_u8(code: u8) -> Option<CmdCode> {
        COMMANDS.get(code as usize).map(|cmd| cmd.code)
    }
}

/// One command table entry.
#[derive(Debug)]
pub struct Command {
    pub name: &'static str,
    pub code: CmdCode,
    pub min_argc: usize,
}

impl Command {
    /// True when the command appends a WAL record before mutating memory.
    pub fn is_mutation(&self) -> bool {
        matches!(
            self.code,
            CmdCode::Set
                | CmdCode::Del
                | CmdCode::List
                | CmdCode::LPush
                | CmdCode::RPush
                | CmdCode::LPop
                | CmdCode::RPop
        )
    }
}

/// The command table, indexed by `CmdCode` discriminant.
pub static COMMANDS: &[Command] = &[
    Command { name: "AUTH", code: CmdCode::Auth, min_argc: 1 },
    Command { name: "SELECT", code: CmdCode::Select, min_argc: 1 },
    Command { name: "DUMP", code: CmdCode::Dump, min_argc: 0 },
    Command { name: "GET", code: CmdCode::Get, min_argc: 1 },
    Command { name: "SET", code: CmdCode::Set, min_argc: 2 },
    Command { name: "DEL", code: CmdCode::Del, min_argc: 1 },
    Command { name: "KEYS", code: CmdCode::Keys, min_argc: 0 },
    Command { name: "LIST", code: CmdCode::List, min_argc: 1 },
    Command { name: "LPUSH", code: CmdCode::LPush, min_argc: 2 },
    Command { name: "RPUSH", code: CmdCode::RPush, min_argc: 2 },
    Command { name: "LPOP", code: CmdCode::LPop, min_argc: 1 },
    Command { name: "RPOP", code: CmdCode::RPop, min_argc: 1 },
    Command { name: "LLEN", code: CmdCode::LLen, min_argc: 1 },
];

static BY_NAME: Lazy<HashMap<&'static str, &'static Command>> =
    Lazy::new(|| COMMANDS.iter().map(|cmd| (cmd.name, cmd)).collect());

/// Case-insensitive lookup by command name.
pub fn lookup(name: &[u8]) -> Option<&'static Command> {
    let upper = String::from_utf8(name.to_ascii_uppercase()).ok()?;
    BY_NAME.get(upper.as_str()).copied()
}

/// Lookup by wire code.
pub fn by_code(code: u8) -> Option<&'static Command> {
    COMMANDS.get(code as usize)
}
