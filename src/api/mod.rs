// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! HTTP surface.
//!
//! Thin handlers over the two stores. All storage work runs on the blocking
//! pool; the handlers themselves are straight-line. Listing responses are
//! newest-first: the index returns chronological order and the handlers
//! reverse it for presentation.

mod manage;
mod r#match;
mod user;

use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error};

use crate::blob::{BlobError, MatchStore};
use crate::index::{IndexError, UserStore};
use crate::kv::TxnSignal;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Shared handler state.
pub struct App {
    pub users: Arc<UserStore>,
    pub matches: Arc<MatchStore>,
}

/// Builds the service router.
pub fn router(app: Arc<App>) -> Router {
    Router::new()
        .route("/match/{id}", get(r#match::get_match).post(r#match::post_match))
        .route("/user/getMatches", get(user::get_matches))
        .route("/user/getMatchesAfter", get(user::get_matches_after))
        .route("/user/getMatchesBefore", get(user::get_matches_before))
        .route("/manage/flatten", get(manage::flatten))
        .route("/manage/backup", get(manage::backup))
        .route("/manage/cleanup", get(manage::cleanup))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .with_state(app)
}

/// Errors a handler can answer with.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("match not found")]
    NotFound,

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Blob(#[from] BlobError),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            // Optimistic conflicts are retryable by the client.
            ApiError::Index(err) if err.is_conflict() => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Blob(err) if err.is_conflict() => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(%status, error = %self, "request failed");
        } else {
            debug!(%status, error = %self, "request rejected");
        }
        (status, self.to_string()).into_response()
    }
}

/// Runs a storage closure on the blocking pool.
async fn run_blocking<T, F>(f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, ApiError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|err| ApiError::Internal(format!("blocking task: {err}")))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request};
    use http_body_util::BodyExt;
    use std::time::Duration;
    use tempfile::TempDir;
    use tower::ServiceExt;

    const TEST_RETENTION: Duration = Duration::from_secs(30 * 365 * 86_400);

    fn create_test_app() -> (Router, TempDir) {
        let dir = TempDir::new().unwrap();
        let users =
            Arc::new(UserStore::open(&dir.path().join("users"), TEST_RETENTION).unwrap());
        let matches =
            Arc::new(MatchStore::open(&dir.path().join("matches"), 512, None).unwrap());
        let app = router(Arc::new(App { users, matches }));
        (app, dir)
    }

    async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = app.clone().oneshot(req).await.unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, body.to_vec())
    }

    fn post(uri: &str, body: &str) -> Request<Body> {
        Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_req(uri: &str) -> Request<Body> {
        Request::get(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_post_then_list_matches() {
        let (app, _dir) = create_test_app();

        let doc = r#"{"version":1,
                      "winner":{"team":"red"},
                      "teams":[{"id":"red","members":[1,2]},{"id":"blue","members":[3,4]}],
                      "players":[{"id":1},{"id":3}]}"#;
        let (status, body) = send(&app, post("/match/4194304", doc)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"OK");

        // Winner's member won, the other player lost.
        let (status, body) = send(&app, get_req("/user/getMatches?user=1&count=10")).await;
        assert_eq!(status, StatusCode::OK);
        let matches: Vec<serde_json::Value> = serde_json::from_slice(&body).unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0]["id"], 4194304u64);
        assert_eq!(matches[0]["state"], 1);

        let (_, body) = send(&app, get_req("/user/getMatches?user=3&count=10")).await;
        let matches: Vec<serde_json::Value> = serde_json::from_slice(&body).unwrap();
        assert_eq!(matches[0]["state"], 0);
    }

    #[tokio::test]
    async fn test_listing_is_newest_first() {
        let (app, _dir) = create_test_app();

        let doc = r#"{"players":[{"id":5}],"winner":{"player":5}}"#;
        for i in 1..=3u64 {
            let id = i << 22;
            let (status, _) = send(&app, post(&format!("/match/{id}"), doc)).await;
            assert_eq!(status, StatusCode::OK);
        }

        let (_, body) = send(&app, get_req("/user/getMatches?user=5")).await;
        let matches: Vec<serde_json::Value> = serde_json::from_slice(&body).unwrap();
        let ids: Vec<u64> = matches.iter().map(|m| m["id"].as_u64().unwrap()).collect();
        assert_eq!(ids, vec![3 << 22, 2 << 22, 1 << 22]);
    }

    #[tokio::test]
    async fn test_blob_roundtrip_compressed() {
        let (app, _dir) = create_test_app();

        // ~4 KiB document: stored compressed, served byte-for-byte.
        let doc = format!(
            r#"{{"version":1,"players":[{}{{"id":9}}]}}"#,
            r#"{"id":9},"#.repeat(400)
        );
        let (status, _) = send(&app, post("/match/1234", &doc)).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(&app, get_req("/match/1234")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, doc.as_bytes());
    }

    #[tokio::test]
    async fn test_gzip_request_body() {
        let (app, _dir) = create_test_app();

        let doc = r#"{"players":[{"id":2}],"winner":{"player":2}}"#;
        let mut encoder =
            flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        std::io::Write::write_all(&mut encoder, doc.as_bytes()).unwrap();
        let compressed = encoder.finish().unwrap();

        let req = Request::post("/match/4194304")
            .header(header::CONTENT_ENCODING, "gzip")
            .body(Body::from(compressed))
            .unwrap();
        let (status, body) = send(&app, req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"OK");

        // The stored blob is the decompressed JSON.
        let (_, body) = send(&app, get_req("/match/4194304")).await;
        assert_eq!(body, doc.as_bytes());
    }

    #[tokio::test]
    async fn test_missing_match_404() {
        let (app, _dir) = create_test_app();
        let (status, _) = send(&app, get_req("/match/999")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_query_validation() {
        let (app, _dir) = create_test_app();

        for uri in [
            "/user/getMatches",
            "/user/getMatches?user=0",
            "/user/getMatches?user=1&count=-1",
            "/user/getMatches?user=1&offset=-1",
            "/user/getMatchesBefore?user=1&before=0",
            "/manage/cleanup",
            "/manage/cleanup?deadline=0",
        ] {
            let (status, _) = send(&app, get_req(uri)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "expected 400 for {uri}");
        }

        let (status, _) = send(&app, get_req("/match/not-a-number")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_empty_history_is_empty_array() {
        let (app, _dir) = create_test_app();
        let (status, body) = send(&app, get_req("/user/getMatches?user=42")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"[]");
    }

    #[tokio::test]
    async fn test_cleanup_reports_both_counters() {
        let (app, _dir) = create_test_app();

        let doc = r#"{"players":[{"id":6}],"winner":{}}"#;
        let (status, _) = send(&app, post("/match/4194304", doc)).await;
        assert_eq!(status, StatusCode::OK);

        // Deadline one bucket past the snowflake epoch: everything above is
        // expired.
        let deadline_secs = (crate::index::SNOWFLAKE_EPOCH_MS / 1000) + 10 * 86_400;
        let uri = format!("/manage/cleanup?deadline={deadline_secs}");
        let (status, body) = send(&app, get_req(&uri)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"OK userMatches:1 matches:1");

        let (status, _) = send(&app, get_req("/match/4194304")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_manage_flatten_and_backup() {
        let (app, _dir) = create_test_app();

        let (status, body) = send(&app, get_req("/manage/flatten")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"OK");

        let (status, body) = send(&app, get_req("/manage/backup")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"OK");
    }
}
