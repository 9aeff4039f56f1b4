//! Operator handlers
//!
//! Authenticated surface: operator event ingestion, ingestion metrics, and
//! the request lifecycle. The actor identity comes from the auth middleware
//! and is attached to every audit entry.

use std::sync::Arc;

use axum::{
    extract::{Extension, Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::Utc;

use vitrina_core::lifecycle::{self, Transition};
use vitrina_core::types::{ProductRequest, StatusUpdatePayload, TrackEventPayload};
use vitrina_core::validate;

use crate::audit::snapshot;
use crate::auth::{self, Claims};
use crate::client_ip::PeerAddr;
use crate::error::{ApiError, AppResult};
use crate::ingest::{self, IngestContext, InsertOutcome};
use crate::metrics;
use crate::state::AppState;

/// POST /api/analytics/events
///
/// Operator-side ingestion: no write key or origin check, its own
/// rate-limit scope, idempotency key optional.
pub async fn register_event(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    peer: PeerAddr,
    headers: HeaderMap,
    Json(payload): Json<TrackEventPayload>,
) -> AppResult<impl IntoResponse> {
    auth::require_operator(&claims)?;
    let ctx = IngestContext::from_headers(peer.0, &headers, &state);
    let response = match ingest::submit_event(&state, &ctx, payload, Some(&claims)).await? {
        InsertOutcome::Inserted(event) => (StatusCode::CREATED, Json(event)),
        InsertOutcome::AlreadyExists(event) => (StatusCode::OK, Json(event)),
    };
    Ok(response)
}

/// GET /api/analytics/ingestion-metrics
pub async fn ingestion_metrics(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
) -> AppResult<impl IntoResponse> {
    auth::require_operator(&claims)?;
    Ok(Json(state.counters.snapshot()))
}

/// GET /api/requests/{id}
pub async fn get_request(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
) -> AppResult<Json<ProductRequest>> {
    auth::require_operator(&claims)?;
    let request = ingest::load_request(&state.db, &id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("unknown request: {id}")))?;
    Ok(Json(request))
}

/// PATCH /api/requests/{id}/status
///
/// Validates the command before touching the row, applies the state
/// machine in memory, persists atomically, then audits the before/after
/// snapshots.
pub async fn update_request_status(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
    Json(payload): Json<StatusUpdatePayload>,
) -> AppResult<Json<ProductRequest>> {
    auth::require_operator(&claims)?;
    validate::validate_status_update(&payload)?;

    let mut request = ingest::load_request(&state.db, &id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("unknown request: {id}")))?;
    let before = snapshot(&request);
    let previous_status = request.status;

    let outcome = lifecycle::apply_transition(
        &mut request,
        Transition {
            target: payload.status,
            reason: payload.reason.clone(),
            actor: claims.sub.clone(),
        },
        state.config.allow_request_reopen,
        Utc::now(),
    )?;
    if let Some(notes) = payload.notes {
        request.notes = Some(notes);
    }

    ingest::persist_transition(&state.db, &request, outcome.changed).await?;

    state
        .audit
        .record(
            Some(&claims.sub),
            Some(&claims.name),
            "product_request",
            &request.id.to_string(),
            "update_status",
            Some(before),
            Some(snapshot(&request)),
        )
        .await?;

    if outcome.changed {
        metrics::record_status_transition(request.status.as_str());
        tracing::info!(
            request_id = %request.id,
            from = previous_status.as_str(),
            to = request.status.as_str(),
            actor = %claims.sub,
            "request status changed"
        );
    }

    Ok(Json(request))
}
