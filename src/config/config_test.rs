// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! Tests for configuration parsing.

#[cfg(test)]
mod tests {
    use crate::config::{Config, DbType};
    use crate::error::AmberError;

    #[test]
    fn test_defaults() {
        let config = Config::from_str("").unwrap();
        assert_eq!(config.address, "127.0.0.1");
        assert_eq!(config.port, 7000);
        assert_eq!(config.data_dir.to_str(), Some("."));
        assert!(!config.daemonize);
        assert_eq!(config.pid_file, "");
        assert_eq!(config.num_workers, 4);
        assert!(!config.auth);
        assert!(config.dbs.is_empty());
    }

    #[test]
    fn test_full_file() {
        let text = r#"
            address = "0.0.0.0"
            port = 7070
            data_dir = "/tmp/amber"
            daemonize = true
            pid_file = "/tmp/amber.pid"
            num_workers = 2
            auth = true
            pass_digest = "0123456789abcdef0123456789abcdef"

            [[db]]
            type = "hash"
            persistent = true
            memory_limit = 1048576

            [[db]]
            type = "order"
        "#;
        let config = Config::from_str(text).unwrap();
        assert_eq!(config.address, "0.0.0.0");
        assert_eq!(config.port, 7070);
        assert_eq!(config.num_workers, 2);
        assert_eq!(config.dbs.len(), 2);
        assert_eq!(config.dbs[0].db_type, DbType::Hash);
        assert!(config.dbs[0].persistent);
        assert_eq!(config.dbs[0].memory_limit, 1_048_576);
        assert_eq!(config.dbs[1].db_type, DbType::Order);
        assert!(!config.dbs[1].persistent);
    }

    #[test]
    fn test_auth_requires_digest() {
        let err = Config::from_str("auth = true").unwrap_err();
        assert!(matches!(err, AmberError::InvalidArgument { .. }));

        let err = Config::from_str("auth = true\npass_digest = \"short\"").unwrap_err();
        assert!(matches!(err, AmberError::InvalidArgument { .. }));
    }

    #[test]
    fn test_unknown_db_type_rejected_at_parse() {
        let err = Config::from_str("[[db]]\ntype = \"btree\"").unwrap_err();
        assert!(matches!(err, AmberError::InvalidArgument { .. }));
    }

    #[test]
    fn test_zero_workers_rejected() {
        let err = Config::from_str("num_workers = 0").unwrap_err();
        assert!(matches!(err, AmberError::InvalidArgument { .. }));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("amberd.toml");
        std::fs::write(&path, "port = 7171\n[[db]]\ntype = \"hash\"").unwrap();
        let config = Config::load(&path).unwrap();
        assert_eq!(config.port, 7171);
        assert_eq!(config.dbs.len(), 1);
    }
}
