// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Service configuration.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

const DAY: Duration = Duration::from_secs(86_400);

/// Command-line and environment configuration.
#[derive(Debug, Parser)]
#[command(name = "arenadb", version, about = "Match-history database service")]
pub struct Config {
    /// Address to bind: `host:port`, or a unix socket path starting with `/`.
    #[arg(long, default_value = "127.0.0.1:8881", env = "ARENADB_BIND")]
    pub bind: String,

    /// Data directory. The user index and the match blobs each get a
    /// subdirectory.
    #[arg(long, default_value = "./db", env = "ARENADB_DIR")]
    pub dir: PathBuf,

    /// Retention window for match data, e.g. `150days`.
    #[arg(
        long,
        default_value = "150days",
        env = "ARENADB_TTL",
        value_parser = humantime::parse_duration
    )]
    pub ttl: Duration,

    /// Compress match documents larger than this many bytes.
    #[arg(long, default_value_t = 512, env = "ARENADB_COMPRESS_THRESHOLD")]
    pub compress_threshold: usize,
}

impl Config {
    pub fn users_path(&self) -> PathBuf {
        self.dir.join("users")
    }

    pub fn matches_path(&self) -> PathBuf {
        self.dir.join("matches")
    }

    /// Blobs outlive the index retention by a day so a listed match is
    /// almost always still fetchable.
    pub fn blob_ttl(&self) -> Duration {
        self.ttl + DAY
    }
}
