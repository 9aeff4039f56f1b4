//! Public tracking handlers

use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};

use vitrina_core::types::{TrackEventPayload, TrackRequestPayload};

use crate::client_ip::PeerAddr;
use crate::error::AppResult;
use crate::ingest::{self, IngestContext, InsertOutcome};
use crate::state::AppState;

/// POST /api/track/events
///
/// 201 with the new event, or 200 with the pre-existing one when the
/// idempotency key was already seen.
pub async fn track_event(
    State(state): State<Arc<AppState>>,
    peer: PeerAddr,
    headers: HeaderMap,
    Json(payload): Json<TrackEventPayload>,
) -> AppResult<impl IntoResponse> {
    let ctx = IngestContext::from_headers(peer.0, &headers, &state);
    let response = match ingest::submit_event(&state, &ctx, payload, None).await? {
        InsertOutcome::Inserted(event) => (StatusCode::CREATED, Json(event)),
        InsertOutcome::AlreadyExists(event) => (StatusCode::OK, Json(event)),
    };
    Ok(response)
}

/// POST /api/track/requests
pub async fn track_request(
    State(state): State<Arc<AppState>>,
    peer: PeerAddr,
    headers: HeaderMap,
    Json(payload): Json<TrackRequestPayload>,
) -> AppResult<impl IntoResponse> {
    let ctx = IngestContext::from_headers(peer.0, &headers, &state);
    let response = match ingest::submit_request(&state, &ctx, payload).await? {
        InsertOutcome::Inserted(request) => (StatusCode::CREATED, Json(request)),
        InsertOutcome::AlreadyExists(request) => (StatusCode::OK, Json(request)),
    };
    Ok(response)
}

pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    // Check database connectivity
    let db_ok = sqlx::query("SELECT 1").fetch_one(&state.db).await.is_ok();

    let status = if db_ok { "ok" } else { "degraded" };
    let status_code = if db_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status_code,
        Json(serde_json::json!({
            "status": status,
            "service": "vitrina-server",
            "version": env!("CARGO_PKG_VERSION"),
            "database": if db_ok { "connected" } else { "disconnected" }
        })),
    )
}
