// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Service binary: wire configuration, stores and the HTTP server.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use arenadb::api::{self, App};
use arenadb::{Config, MatchStore, UserStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::parse();

    let users = Arc::new(
        UserStore::open(&config.users_path(), config.ttl)
            .context("opening users database")?,
    );
    let matches = Arc::new(
        MatchStore::open(
            &config.matches_path(),
            config.compress_threshold,
            Some(config.blob_ttl()),
        )
        .context("opening matches database")?,
    );

    let router = api::router(Arc::new(App { users, matches }));

    if config.bind.starts_with('/') {
        // A leftover socket file from an unclean shutdown blocks the bind.
        let _ = std::fs::remove_file(&config.bind);
        let listener = tokio::net::UnixListener::bind(&config.bind)
            .with_context(|| format!("binding unix socket {}", config.bind))?;
        info!(bind = %config.bind, "listening");
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
    } else {
        let listener = tokio::net::TcpListener::bind(&config.bind)
            .await
            .with_context(|| format!("binding {}", config.bind))?;
        info!(bind = %config.bind, "listening");
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
    }

    Ok(())
}

async fn shutdown_signal() {
    let mut term = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
    {
        Ok(term) => term,
        Err(err) => {
            tracing::warn!(error = %err, "failed to install SIGTERM handler");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = term.recv() => {}
    }
    info!("shutting down");
}
