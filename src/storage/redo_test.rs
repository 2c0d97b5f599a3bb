// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! Tests for WAL replay.

#[cfg(test)]
mod tests {
    use crate::background::BackgroundQueue;
    use crate::command::CmdCode;
    use crate::config::{DbConf, DbType};
    use crate::db::{Db, HashDb};
    use crate::error::AmberError;
    use crate::storage::redo::{redo_command, replay_log};
    use crate::storage::wal::{BinLogWriter, LoggedOp};
    use crate::value::obj::Value;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn memory_db(dir: &TempDir) -> Arc<HashDb> {
        let conf = DbConf {
            db_type: DbType::Hash,
            persistent: false,
            memory_limit: 0,
        };
        let db = HashDb::new(&conf, dir.path(), 0, 64, BackgroundQueue::new());
        db.open().unwrap();
        db
    }

    #[test]
    fn test_replay_set_and_del() {
        let dir = TempDir::new().unwrap();
        let db = memory_db(&dir);

        let log_path = dir.path().join("log-0");
        let mut writer = BinLogWriter::new(std::fs::File::create(&log_path).unwrap());
        writer
            .append(CmdCode::Set as u8, 100, &[Value::string("a"), Value::string("one")])
            .unwrap();
        writer
            .append(CmdCode::Set as u8, 200, &[Value::string("b"), Value::integer(2)])
            .unwrap();
        writer
            .append(CmdCode::Del as u8, 0, &[Value::string("a")])
            .unwrap();
        drop(writer);

        let replayed = replay_log(&log_path, db.as_ref()).unwrap();
        assert_eq!(replayed, 3);
        assert!(db.get(b"a").is_err());
        let (version, value) = db.get(b"b").unwrap();
        assert_eq!(version.number, 200);
        assert_eq!(value.as_int(), Some(2));
    }

    #[test]
    fn test_replay_list_lifecycle() {
        let dir = TempDir::new().unwrap();
        let db = memory_db(&dir);

        let ops = [
            LoggedOp {
                code: CmdCode::List as u8,
                version: 50,
                args: vec![Value::string("q"), Value::string("b")],
            },
            LoggedOp {
                code: CmdCode::LPush as u8,
                version: 0,
                args: vec![Value::string("q"), Value::string("a")],
            },
            LoggedOp {
                code: CmdCode::RPush as u8,
                version: 0,
                args: vec![Value::string("q"), Value::string("c"), Value::string("d")],
            },
            LoggedOp {
                code: CmdCode::RPop as u8,
                version: 0,
                args: vec![Value::string("q")],
            },
        ];
        for op in &ops {
            redo_command(db.as_ref(), op).unwrap();
        }

        // [b] -> [a, b] -> [a, b, c, d] -> [a, b, c]
        let mut contents = Vec::new();
        db.exec(b"q", &mut |_, value| {
            if let Value::List(list) = &**value {
                contents = list
                    .iter()
                    .map(|elem| elem.as_bytes().unwrap().to_vec())
                    .collect();
            }
        })
        .unwrap();
        assert_eq!(contents, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
    }

    #[test]
    fn test_push_on_missing_key_is_skipped() {
        let dir = TempDir::new().unwrap();
        let db = memory_db(&dir);
        let op = LoggedOp {
            code: CmdCode::LPush as u8,
            version: 0,
            args: vec![Value::string("ghost"), Value::string("x")],
        };
        redo_command(db.as_ref(), &op).unwrap();
        assert_eq!(db.num_keys(), 0);
    }

    #[test]
    fn test_bad_command_code_is_corruption() {
        let dir = TempDir::new().unwrap();
        let db = memory_db(&dir);
        let op = LoggedOp {
            code: 0xEE,
            version: 0,
            args: vec![],
        };
        assert!(matches!(
            redo_command(db.as_ref(), &op),
            Err(AmberError::Corruption { .. })
        ));
    }

    #[test]
    fn test_read_only_command_in_log_is_corruption() {
        let dir = TempDir::new().unwrap();
        let db = memory_db(&dir);
        let op = LoggedOp {
            code: CmdCode::Get as u8,
            version: 0,
            args: vec![Value::string("k")],
        };
        assert!(matches!(
            redo_command(db.as_ref(), &op),
            Err(AmberError::Corruption { .. })
        ));
    }

    #[test]
    fn test_short_args_is_corruption() {
        let dir = TempDir::new().unwrap();
        let db = memory_db(&dir);
        let op = LoggedOp {
            code: CmdCode::Set as u8,
            version: 0,
            args: vec![Value::string("only-key")],
        };
        assert!(matches!(
            redo_command(db.as_ref(), &op),
            Err(AmberError::Corruption { .. })
        ));
    }
}
