// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! AmberDB server daemon.
//!
//! Loads the TOML configuration, optionally daemonizes, then runs the
//! accept loop on the main thread. Exits 0 on clean shutdown and 1 when
//! initialization fails.

use amberdb::{Config, Server};
use clap::Parser;
use log::{error, info};
use std::io::Write;
use std::path::PathBuf;
use std::process;

#[derive(Parser, Debug)]
#[command(name = "amberd", about = "AmberDB key-value server")]
struct Args {
    /// Configuration file path.
    #[arg(short, long, default_value = "./amberd.toml")]
    conf_file: PathBuf,

    /// Per-worker event table capacity.
    #[arg(long, default_value_t = 1024)]
    max_events: usize,
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    let config = match Config::load(&args.conf_file) {
        Ok(config) => config,
        Err(err) => {
            error!("{}: {}", args.conf_file.display(), err);
            process::exit(1);
        }
    };

    if config.daemonize {
        if let Err(err) = daemonize() {
            error!("daemonize failed: {}", err);
            process::exit(1);
        }
    }
    if !config.pid_file.is_empty() {
        if let Err(err) = write_pid_file(&config.pid_file) {
            error!("cannot write pid file {}: {}", config.pid_file, err);
            process::exit(1);
        }
    }

    let mut server = Server::new(config, args.max_events);
    if let Err(err) = server.init() {
        error!("init failed: {}", err);
        process::exit(1);
    }

    info!("amberd ready");
    server.run();
}

/// Double-fork into the background and detach from the controlling
/// terminal.
fn daemonize() -> std::io::Result<()> {
    unsafe {
        match libc::fork() {
            -1 => return Err(std::io::Error::last_os_error()),
            0 => {}
            _ => process::exit(0),
        }
        if libc::setsid() < 0 {
            return Err(std::io::Error::last_os_error());
        }
        match libc::fork() {
            -1 => return Err(std::io::Error::last_os_error()),
            0 => {}
            _ => process::exit(0),
        }
    }
    Ok(())
}

fn write_pid_file(path: &str) -> std::io::Result<()> {
    let mut file = std::fs::File::create(path)?;
    writeln!(file, "{}", process::id())
}
