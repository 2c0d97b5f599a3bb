// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! Server configuration.
//!
//! Loaded once at startup from a TOML file and read-only afterwards.
//!
//! ```toml
//! address = "127.0.0.1"
//! port = 7000
//! data_dir = "/var/lib/amberdb"
//! num_workers = 4
//! auth = true
//! pass_digest = "0123456789abcdef0123456789abcdef"
//!
//! [[db]]
//! type = "hash"
//! persistent = true
//!
//! [[db]]
//! type = "hash"
//! ```

use crate::error::{AmberError, AmberResult};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[cfg(test)]
mod config_test;

/// Kind of engine backing one logical database. Only `hash` is
/// implemented; `order` and `page` are reserved configuration slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DbType {
    Hash,
    Order,
    Page,
}

/// One `[[db]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct DbConf {
    #[serde(rename = "type")]
    pub db_type: DbType,
    #[serde(default)]
    pub persistent: bool,
    #[serde(default)]
    pub memory_limit: u64,
}

/// Whole-server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_address")]
    pub address: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default)]
    pub daemonize: bool,
    #[serde(default)]
    pub pid_file: String,
    #[serde(default = "default_num_workers")]
    pub num_workers: usize,
    #[serde(default)]
    pub auth: bool,
    #[serde(default)]
    pub pass_digest: String,
    #[serde(rename = "db", default)]
    pub dbs: Vec<DbConf>,
}

fn default_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    7000
}

fn default_data_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_num_workers() -> usize {
    4
}

impl Default for Config {
    fn default() -> Config {
        Config {
            address: default_address(),
            port: default_port(),
            data_dir: default_data_dir(),
            daemonize: false,
            pid_file: String::new(),
            num_workers: default_num_workers(),
            auth: false,
            pass_digest: String::new(),
            dbs: Vec::new(),
        }
    }
}

impl Config {
    /// Parses a configuration file.
    pub fn load(path: &Path) -> AmberResult<Config> {
        let text = std::fs::read_to_string(path)
            .map_err(|err| AmberError::io(format!("read_conf: {}", path.display()), err))?;
        Config::from_str(&text)
    }

    /// Parses configuration text; used directly by tests.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(text: &str) -> AmberResult<Config> {
        let config: Config = toml::from_str(text)
            .map_err(|err| AmberError::invalid(format!("bad configuration: {}", err)))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> AmberResult<()> {
        if self.auth {
            let digest_ok = self.pass_digest.len() == 32
                && self.pass_digest.bytes().all(|b| b.is_ascii_hexdigit());
            if !digest_ok {
                return Err(AmberError::invalid(
                    "auth requires pass_digest to be 32 hex characters",
                ));
            }
        }
        if self.num_workers == 0 {
            return Err(AmberError::invalid("num_workers must be at least 1"));
        }
        Ok(())
    }
}
