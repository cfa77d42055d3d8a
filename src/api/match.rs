// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Match blob handlers and winner-set resolution.

use std::borrow::Cow;
use std::io::Read;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use tracing::debug;

use crate::index::{IndexError, STATE_DRAW, STATE_LOSS, STATE_WIN};

use super::{run_blocking, ApiError, App};

/// The accepted match document. Unknown fields are ignored.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct MatchDoc {
    #[serde(default)]
    pub version: i32,
    #[serde(default)]
    pub winner: Winner,
    #[serde(default)]
    pub teams: Vec<Team>,
    #[serde(default)]
    pub players: Vec<Player>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct Winner {
    #[serde(default)]
    pub player: u32,
    #[serde(default)]
    pub players: Vec<u32>,
    #[serde(default)]
    pub team: String,
    #[serde(default)]
    pub teams: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Team {
    pub id: String,
    #[serde(default)]
    pub members: Vec<u32>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Player {
    pub id: u32,
}

/// Resolves the set of winning user ids.
///
/// Precedence: single `player`, then `players`, then a single `team`'s
/// members, then the union of the named `teams`' members. An empty result
/// means no declared winner.
pub(crate) fn resolve_winners(doc: &MatchDoc) -> Vec<u32> {
    if doc.winner.player != 0 {
        return vec![doc.winner.player];
    }
    if !doc.winner.players.is_empty() {
        return doc.winner.players.clone();
    }
    if !doc.winner.team.is_empty() {
        for team in &doc.teams {
            if team.id == doc.winner.team {
                return team.members.clone();
            }
        }
        return Vec::new();
    }
    if !doc.winner.teams.is_empty() {
        let mut winners = Vec::new();
        for team in &doc.teams {
            if doc.winner.teams.iter().any(|id| id == &team.id) {
                winners.extend_from_slice(&team.members);
            }
        }
        return winners;
    }
    Vec::new()
}

/// The state byte a player gets for this match.
pub(crate) fn state_for(player: u32, winners: &[u32]) -> u8 {
    if winners.is_empty() {
        STATE_DRAW
    } else if winners.contains(&player) {
        STATE_WIN
    } else {
        STATE_LOSS
    }
}

pub(crate) async fn get_match(
    State(app): State<Arc<App>>,
    Path(id): Path<u64>,
) -> Result<Response, ApiError> {
    let matches = app.matches.clone();
    let data = run_blocking(move || matches.get(id).map_err(ApiError::from)).await?;
    match data {
        Some(data) => {
            Ok(([(header::CONTENT_TYPE, "application/json")], data).into_response())
        }
        None => Err(ApiError::NotFound),
    }
}

pub(crate) async fn post_match(
    State(app): State<Arc<App>>,
    Path(id): Path<u64>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<&'static str, ApiError> {
    let body = decode_body(&headers, body)?;
    let doc: MatchDoc = serde_json::from_slice(&body)
        .map_err(|err| ApiError::BadRequest(format!("invalid match json: {err}")))?;
    debug!(id, version = doc.version, players = doc.players.len(), "storing match");

    let users = app.users.clone();
    let matches = app.matches.clone();
    run_blocking(move || {
        // The blob first, then the index fan-out; the stores are independent.
        matches.put(id, Cow::Owned(body))?;

        let winners = resolve_winners(&doc);
        users.transaction(true, |txn| {
            for player in &doc.players {
                txn.add_match(player.id, id, state_for(player.id, &winners))?;
            }
            Ok::<_, IndexError>(())
        })?;
        Ok(())
    })
    .await?;

    Ok("OK")
}

/// Request bodies may arrive gzip-compressed.
fn decode_body(headers: &HeaderMap, body: Bytes) -> Result<Vec<u8>, ApiError> {
    let gzipped = headers
        .get(header::CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("gzip"));
    if !gzipped {
        return Ok(body.to_vec());
    }
    let mut decoded = Vec::with_capacity(body.len() * 3);
    flate2::read::GzDecoder::new(body.as_ref())
        .read_to_end(&mut decoded)
        .map_err(|err| ApiError::BadRequest(format!("invalid gzip body: {err}")))?;
    Ok(decoded)
}
