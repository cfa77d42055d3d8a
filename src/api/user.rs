// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Per-user listing handlers.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;

use crate::index::UserMatch;

use super::{run_blocking, ApiError, App};

const DEFAULT_COUNT: i64 = 20;

#[derive(Debug, Deserialize)]
pub(crate) struct TailQuery {
    user: Option<i64>,
    offset: Option<i64>,
    count: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AfterQuery {
    user: Option<i64>,
    after: Option<u64>,
    count: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct BeforeQuery {
    user: Option<i64>,
    before: Option<u64>,
    count: Option<i64>,
}

fn parse_user(user: Option<i64>) -> Result<u32, ApiError> {
    match user {
        Some(user) if user > 0 && user <= u32::MAX as i64 => Ok(user as u32),
        _ => Err(ApiError::BadRequest("invalid user id".into())),
    }
}

fn parse_count(count: Option<i64>) -> Result<usize, ApiError> {
    let count = count.unwrap_or(DEFAULT_COUNT);
    if count < 0 {
        return Err(ApiError::BadRequest("invalid count".into()));
    }
    Ok(count as usize)
}

pub(crate) async fn get_matches(
    State(app): State<Arc<App>>,
    Query(query): Query<TailQuery>,
) -> Result<Json<Vec<UserMatch>>, ApiError> {
    let user = parse_user(query.user)?;
    let count = parse_count(query.count)?;
    let offset = query.offset.unwrap_or(0);
    if offset < 0 {
        return Err(ApiError::BadRequest("invalid offset".into()));
    }
    let offset = offset as usize;

    let users = app.users.clone();
    let mut matches = run_blocking(move || {
        users
            .get_last_user_matches(user, offset, count)
            .map_err(ApiError::from)
    })
    .await?;
    matches.reverse();
    Ok(Json(matches))
}

pub(crate) async fn get_matches_after(
    State(app): State<Arc<App>>,
    Query(query): Query<AfterQuery>,
) -> Result<Json<Vec<UserMatch>>, ApiError> {
    let user = parse_user(query.user)?;
    let count = parse_count(query.count)?;
    let after = query.after.unwrap_or(0);

    let users = app.users.clone();
    let mut matches = run_blocking(move || {
        users
            .get_user_matches_after(user, after, count)
            .map_err(ApiError::from)
    })
    .await?;
    matches.reverse();
    Ok(Json(matches))
}

pub(crate) async fn get_matches_before(
    State(app): State<Arc<App>>,
    Query(query): Query<BeforeQuery>,
) -> Result<Json<Vec<UserMatch>>, ApiError> {
    let user = parse_user(query.user)?;
    let count = parse_count(query.count)?;
    let before = match query.before {
        Some(before) if before > 0 => before,
        _ => return Err(ApiError::BadRequest("invalid before".into())),
    };

    let users = app.users.clone();
    let mut matches = run_blocking(move || {
        users
            .get_user_matches_before(user, before, count)
            .map_err(ApiError::from)
    })
    .await?;
    matches.reverse();
    Ok(Json(matches))
}
