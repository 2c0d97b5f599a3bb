// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! WAL replay.
//!
//! Applies logged mutation records back through the database surface, in
//! record order. Framing damage is corruption and stops recovery. A list
//! operation whose target key is gone or has changed type is replayed as
//! a no-op instead: the log records commands in append order, not map
//! mutation order, so a record can legitimately refer to an entry a later
//! record (already applied in memory before the crash) removed.

use crate::command::CmdCode;
use crate::db::Db;
use crate::error::{AmberError, AmberResult};
use crate::storage::wal::{BinLogReader, LoggedOp};
use crate::sync::list::LockFreeList;
use crate::value::obj::{Value, ValueHandle};
use log::warn;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

/// Replays a whole log file into `db`, returning the record count.
pub fn replay_log(path: &Path, db: &dyn Db) -> AmberResult<usize> {
    let file = File::open(path)
        .map_err(|err| AmberError::io(format!("open_log: {}", path.display()), err))?;
    let mut reader = BinLogReader::new(BufReader::new(file));

    let mut count = 0;
    while let Some(op) = reader.read()? {
        redo_command(db, &op)?;
        count += 1;
    }
    Ok(count)
}

/// Applies one logged record.
pub fn redo_command(db: &dyn Db, op: &LoggedOp) -> AmberResult<()> {
    let code = CmdCode::from_u8(op.code)
        .ok_or_else(|| AmberError::corruption(format!("bad command code {}", op.code)))?;

    match code {
        CmdCode::Set => {
            let key = logged_key(op)?;
            let value = logged_arg(op, 1)?;
            db.put(key, op.version as u64, value.clone())
        }
        CmdCode::Del => {
            let key = logged_key(op)?;
            db.delete(key);
            Ok(())
        }
        CmdCode::List => {
            let key = logged_key(op)?;
            let list = LockFreeList::new();
            for element in &op.args[1..] {
                list.push_back(element.clone());
            }
            db.put(key, op.version as u64, Arc::new(Value::List(list)))
        }
        CmdCode::LPush | CmdCode::RPush => {
            let key = logged_key(op)?;
            let result = db.exec(key, &mut |_, value| {
                if let Value::List(list) = &**value {
                    for element in &op.args[1..] {
                        if code == CmdCode::LPush {
                            list.push_front(element.clone());
                        } else {
                            list.push_back(element.clone());
                        }
                    }
                } else {
                    warn!("replay: push on non-list key, skipped");
                }
            });
            skip_missing(result, "push")
        }
        CmdCode::LPop | CmdCode::RPop => {
            let key = logged_key(op)?;
            let result = db.exec_mut(key, &mut |_, value| {
                if let Value::List(list) = &**value {
                    let popped = if code == CmdCode::LPop {
                        list.pop_front()
                    } else {
                        list.pop_back()
                    };
                    drop(popped);
                } else {
                    warn!("replay: pop on non-list key, skipped");
                }
            });
            skip_missing(result, "pop")
        }
        CmdCode::Auth
        | CmdCode::Select
        | CmdCode::Dump
        | CmdCode::Get
        | CmdCode::Keys
        | CmdCode::LLen => Err(AmberError::corruption(format!(
            "non-mutating command {:?} in log",
            code
        ))),
    }
}

fn logged_key(op: &LoggedOp) -> AmberResult<&[u8]> {
    logged_arg(op, 0)?
        .as_bytes()
        .ok_or_else(|| AmberError::corruption("bad key type in log record"))
}

fn logged_arg(op: &LoggedOp, index: usize) -> AmberResult<&ValueHandle> {
    op.args
        .get(index)
        .ok_or_else(|| AmberError::corruption("short argument list in log record"))
}

fn skip_missing(result: AmberResult<()>, what: &str) -> AmberResult<()> {
    match result {
        Err(AmberError::NotFound) => {
            warn!("replay: {} on missing key, skipped", what);
            Ok(())
        }
        other => other,
    }
}
