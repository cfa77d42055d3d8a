// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Operational endpoints: compaction, backup, retention cleanup.

use std::sync::Arc;
use std::time::{Duration, UNIX_EPOCH};

use axum::extract::{Query, State};
use serde::Deserialize;
use tracing::info;

use super::{run_blocking, ApiError, App};

pub(crate) async fn flatten(State(app): State<Arc<App>>) -> Result<&'static str, ApiError> {
    let users = app.users.clone();
    let matches = app.matches.clone();
    run_blocking(move || {
        users.flatten()?;
        matches.flatten()?;
        Ok(())
    })
    .await?;
    Ok("OK")
}

pub(crate) async fn backup(State(app): State<Arc<App>>) -> Result<&'static str, ApiError> {
    let users = app.users.clone();
    let matches = app.matches.clone();
    run_blocking(move || {
        matches.backup()?;
        users.backup()?;
        Ok(())
    })
    .await?;
    Ok("OK")
}

#[derive(Debug, Deserialize)]
pub(crate) struct CleanupQuery {
    deadline: Option<u64>,
}

/// Purges both stores up to the given unix-second deadline.
pub(crate) async fn cleanup(
    State(app): State<Arc<App>>,
    Query(query): Query<CleanupQuery>,
) -> Result<String, ApiError> {
    let deadline_secs = query.deadline.unwrap_or(0);
    if deadline_secs == 0 {
        return Err(ApiError::BadRequest("invalid deadline".into()));
    }
    let deadline = UNIX_EPOCH + Duration::from_secs(deadline_secs);

    let users = app.users.clone();
    let matches = app.matches.clone();
    run_blocking(move || {
        let user_matches = users.purge(deadline)?;
        let match_blobs = matches.purge(deadline)?;
        info!(deadline_secs, user_matches, match_blobs, "cleanup finished");
        Ok(format!("OK userMatches:{user_matches} matches:{match_blobs}"))
    })
    .await
}
