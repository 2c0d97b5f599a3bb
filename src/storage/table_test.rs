// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! Tests for the table codec.

#[cfg(test)]
mod tests {
    use crate::background::BackgroundQueue;
    use crate::config::{DbConf, DbType};
    use crate::db::{Db, HashDb};
    use crate::error::AmberError;
    use crate::storage::table::{dump_table, load_table, TableOptions, TABLE_MAGIC};
    use crate::value::obj::Value;
    use std::fs;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn memory_db(dir: &TempDir, id: usize) -> Arc<HashDb> {
        let conf = DbConf {
            db_type: DbType::Hash,
            persistent: false,
            memory_limit: 0,
        };
        let db = HashDb::new(&conf, dir.path(), id, 64, BackgroundQueue::new());
        db.open().unwrap();
        db
    }

    #[test]
    fn test_dump_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let source = memory_db(&dir, 0);
        source.put(b"name", 10, Value::string("Jake")).unwrap();
        source.put(b"id", 11, Value::integer(100)).unwrap();
        source.put(b"", 12, Value::string("empty-key")).unwrap();

        let path = dir.path().join("table-1");
        dump_table(
            &TableOptions {
                file_name: &path,
                overwrite: false,
            },
            source.as_ref(),
        )
        .unwrap();

        let target = memory_db(&dir, 1);
        load_table(
            &TableOptions {
                file_name: &path,
                overwrite: false,
            },
            target.as_ref(),
        )
        .unwrap();

        assert_eq!(target.num_keys(), 3);
        let (version, value) = target.get(b"name").unwrap();
        assert_eq!(version.number, 10);
        assert_eq!(value.as_bytes(), Some(&b"Jake"[..]));
        let (_, id) = target.get(b"id").unwrap();
        assert_eq!(id.as_int(), Some(100));
        assert!(target.get(b"").is_ok());
    }

    #[test]
    fn test_header_layout() {
        let dir = TempDir::new().unwrap();
        let source = memory_db(&dir, 0);
        source.put(b"k", 0, Value::string("v")).unwrap();

        let path = dir.path().join("table-1");
        dump_table(
            &TableOptions {
                file_name: &path,
                overwrite: false,
            },
            source.as_ref(),
        )
        .unwrap();

        let bytes = fs::read(&path).unwrap();
        assert_eq!(&bytes[..4], TABLE_MAGIC);
        assert_eq!(&bytes[8..16], &[0u8; 8]);
        let stored = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        assert_eq!(stored, crc32fast::hash(&bytes[16..]));
    }

    #[test]
    fn test_exclusive_create_refuses_existing() {
        let dir = TempDir::new().unwrap();
        let source = memory_db(&dir, 0);
        let path = dir.path().join("table-1");
        fs::write(&path, b"occupied").unwrap();

        let result = dump_table(
            &TableOptions {
                file_name: &path,
                overwrite: false,
            },
            source.as_ref(),
        );
        assert!(matches!(result, Err(AmberError::IoError { .. })));

        dump_table(
            &TableOptions {
                file_name: &path,
                overwrite: true,
            },
            source.as_ref(),
        )
        .unwrap();
    }

    #[test]
    fn test_bad_magic_is_corruption() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("table-1");
        fs::write(&path, b"NOPE............").unwrap();

        let target = memory_db(&dir, 0);
        let result = load_table(
            &TableOptions {
                file_name: &path,
                overwrite: false,
            },
            target.as_ref(),
        );
        assert!(matches!(result, Err(AmberError::Corruption { .. })));
    }

    #[test]
    fn test_flipped_byte_is_corruption() {
        let dir = TempDir::new().unwrap();
        let source = memory_db(&dir, 0);
        for i in 0..50 {
            source
                .put(format!("key-{}", i).as_bytes(), 0, Value::string(format!("value-{}", i)))
                .unwrap();
        }

        let path = dir.path().join("table-1");
        dump_table(
            &TableOptions {
                file_name: &path,
                overwrite: false,
            },
            source.as_ref(),
        )
        .unwrap();

        let mut bytes = fs::read(&path).unwrap();
        let middle = 16 + (bytes.len() - 16) / 2;
        bytes[middle] ^= 0xff;
        fs::write(&path, &bytes).unwrap();

        let target = memory_db(&dir, 1);
        let result = load_table(
            &TableOptions {
                file_name: &path,
                overwrite: false,
            },
            target.as_ref(),
        );
        assert!(matches!(result, Err(AmberError::Corruption { .. })));
    }

    #[test]
    fn test_empty_db_round_trip() {
        let dir = TempDir::new().unwrap();
        let source = memory_db(&dir, 0);
        let path = dir.path().join("table-1");
        dump_table(
            &TableOptions {
                file_name: &path,
                overwrite: false,
            },
            source.as_ref(),
        )
        .unwrap();

        let target = memory_db(&dir, 1);
        load_table(
            &TableOptions {
                file_name: &path,
                overwrite: false,
            },
            target.as_ref(),
        )
        .unwrap();
        assert_eq!(target.num_keys(), 0);
    }
}
