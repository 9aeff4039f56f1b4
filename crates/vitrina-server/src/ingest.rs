//! Ingestion gateway
//!
//! Orchestrates authentication, origin checks, rate limiting, reference
//! validation and idempotent persistence for tracking events and purchase
//! requests. Duplicate submissions racing on the same idempotency key all
//! observe the canonical first-writer row: the losing insert hits the
//! unique index, rolls back, and re-queries.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

use axum::http::HeaderMap;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use vitrina_core::lifecycle::{self, RequestStatus};
use vitrina_core::types::{
    AnalyticsEvent, EventType, ProductRequest, ProductRequestItem, StatusHistoryEntry,
    TrackEventPayload, TrackRequestPayload,
};
use vitrina_core::validate;

use crate::audit::snapshot;
use crate::auth::Claims;
use crate::client_ip::resolve_client_ip;
use crate::db::is_unique_violation;
use crate::error::ApiError;
use crate::metrics;
use crate::rate_limit;
use crate::state::AppState;

/// Result of an idempotent insert. `AlreadyExists` is success, not an
/// error: the dedup path returns the original entity.
#[derive(Debug)]
pub enum InsertOutcome<T> {
    Inserted(T),
    AlreadyExists(T),
}

/// Transport-level call context, resolved once per request.
pub struct IngestContext {
    pub client_ip: String,
    pub origin: Option<String>,
    pub events_key: Option<String>,
    /// Caller-supplied X-Request-Id, used only for log correlation.
    pub correlation_id: Option<String>,
}

impl IngestContext {
    pub fn from_headers(peer: Option<SocketAddr>, headers: &HeaderMap, state: &AppState) -> Self {
        let peer_ip = peer.map(|addr| addr.ip().to_string());
        let client_ip = resolve_client_ip(
            peer_ip.as_deref(),
            headers,
            &state.trusted_proxies,
            state.config.trust_proxy_headers,
        );
        let header_value = |name: &str| {
            headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string)
        };
        Self {
            client_ip,
            origin: header_value("origin"),
            events_key: header_value("x-events-key"),
            correlation_id: header_value("x-request-id"),
        }
    }
}

fn check_origin(state: &AppState, origin: Option<&str>) -> Result<(), ApiError> {
    let allowed = &state.config.tracking_allowed_origins;
    if allowed.is_empty() {
        return Ok(());
    }
    match origin {
        Some(origin) if allowed.iter().any(|entry| entry == origin) => Ok(()),
        _ => Err(ApiError::Forbidden),
    }
}

fn check_rate_limit(
    state: &AppState,
    scope: &str,
    client_ip: &str,
    visitor_id: Option<&str>,
    session_id: &str,
    max_requests: u32,
    window_seconds: u64,
) -> Result<(), ApiError> {
    let key = rate_limit::composite_key(scope, client_ip, visitor_id, session_id);
    let (allowed, retry_after) =
        state
            .rate_limiter
            .allow(&key, max_requests, Duration::from_secs(window_seconds));
    if allowed {
        Ok(())
    } else {
        tracing::warn!(scope, client_ip, "rate limit exceeded");
        Err(ApiError::RateLimited { retry_after })
    }
}

async fn request_exists(db: &SqlitePool, id: &str) -> Result<bool, sqlx::Error> {
    let found: Option<String> = sqlx::query_scalar("SELECT id FROM product_requests WHERE id = ?")
        .bind(id)
        .fetch_optional(db)
        .await?;
    Ok(found.is_some())
}

async fn check_event_references(
    state: &AppState,
    payload: &TrackEventPayload,
) -> Result<(), ApiError> {
    let mut missing = Vec::new();
    if let Some(id) = payload.product_id.as_deref() {
        if !state.catalog.product_exists(id).await? {
            missing.push(format!("product {id}"));
        }
    }
    if let Some(id) = payload.catalog_id.as_deref() {
        if !state.catalog.catalog_exists(id).await? {
            missing.push(format!("catalog {id}"));
        }
    }
    if let Some(id) = payload.request_id.as_deref() {
        if !request_exists(&state.db, id).await? {
            missing.push(format!("request {id}"));
        }
    }
    if missing.is_empty() {
        Ok(())
    } else {
        Err(ApiError::NotFound(format!(
            "unknown references: {}",
            missing.join(", ")
        )))
    }
}

/// Accept one tracking event.
///
/// `actor` is `None` on the public path (write-key auth + origin check +
/// public limits + mandatory idempotency key) and `Some` for operator
/// submissions, which skip the public prelude but still rate-limit under
/// their own scope.
pub async fn submit_event(
    state: &AppState,
    ctx: &IngestContext,
    payload: TrackEventPayload,
    actor: Option<&Claims>,
) -> Result<InsertOutcome<AnalyticsEvent>, ApiError> {
    let public = actor.is_none();

    if public {
        state.counters.record_total();
    }

    let key_id = if public {
        match state.write_keys.resolve(ctx.events_key.as_deref()) {
            Ok(key_id) => key_id,
            Err(err) => {
                state.counters.record_unauthorized();
                metrics::record_event_outcome("unauthorized");
                return Err(err);
            }
        }
    } else {
        None
    };

    if public {
        check_origin(state, ctx.origin.as_deref())?;
    }

    validate::validate_event(&payload, public)?;

    let (scope, max_requests, window_seconds) = if public {
        (
            "track-events",
            state.config.public_event_rate_limit_requests,
            state.config.public_event_rate_limit_window_seconds,
        )
    } else {
        (
            "admin-events",
            state.config.event_rate_limit_requests,
            state.config.event_rate_limit_window_seconds,
        )
    };
    if let Err(err) = check_rate_limit(
        state,
        scope,
        &ctx.client_ip,
        payload.visitor_id.as_deref(),
        &payload.session_id,
        max_requests,
        window_seconds,
    ) {
        if public {
            state.counters.record_rate_limited();
        }
        metrics::record_event_outcome("rate_limited");
        return Err(err);
    }

    check_event_references(state, &payload).await?;

    if let Some(key) = payload.idempotency_key.as_deref() {
        if let Some(existing) = load_event_by_key(&state.db, key).await? {
            if public {
                state.counters.record_duplicated();
            }
            metrics::record_event_outcome("duplicated");
            return Ok(InsertOutcome::AlreadyExists(existing));
        }
    }

    let now = Utc::now();
    let event = AnalyticsEvent {
        id: Uuid::new_v4(),
        event_type: payload.event_type,
        product_id: payload.product_id,
        catalog_id: payload.catalog_id,
        request_id: payload.request_id,
        page_path: payload.page_path,
        source: validate::normalized_source(&payload.source),
        session_id: payload.session_id,
        visitor_id: payload.visitor_id,
        idempotency_key: payload.idempotency_key,
        key_id,
        occurred_at: payload.occurred_at.unwrap_or(now),
        received_at: now,
        utm_source: payload.utm_source,
        utm_medium: payload.utm_medium,
        utm_campaign: payload.utm_campaign,
        referrer: payload.referrer,
    };

    match insert_event(&state.db, &event).await? {
        InsertOutcome::AlreadyExists(existing) => {
            if public {
                state.counters.record_duplicated();
            }
            metrics::record_event_outcome("duplicated");
            Ok(InsertOutcome::AlreadyExists(existing))
        }
        InsertOutcome::Inserted(event) => {
            let (actor_id, actor_name) = match actor {
                Some(claims) => (Some(claims.sub.as_str()), Some(claims.name.as_str())),
                None => (event.key_id.as_deref(), None),
            };
            state
                .audit
                .record(
                    actor_id,
                    actor_name,
                    "analytics_event",
                    &event.id.to_string(),
                    "ingest",
                    None,
                    Some(snapshot(&event)),
                )
                .await?;
            if public {
                state.counters.record_ingested();
            }
            metrics::record_event_outcome("ingested");
            tracing::info!(
                client_ip = %ctx.client_ip,
                correlation = ?ctx.correlation_id,
                event_type = event.event_type.as_str(),
                "event ingested"
            );
            Ok(InsertOutcome::Inserted(event))
        }
    }
}

/// Accept one public purchase-intent request.
///
/// The request row, its merged line items and the correlated
/// `request_submitted` event commit in a single transaction, so a client
/// disconnect can never leave a half-written request.
pub async fn submit_request(
    state: &AppState,
    ctx: &IngestContext,
    payload: TrackRequestPayload,
) -> Result<InsertOutcome<ProductRequest>, ApiError> {
    let key_id = match state.write_keys.resolve(ctx.events_key.as_deref()) {
        Ok(key_id) => key_id,
        Err(err) => {
            metrics::record_request_outcome("unauthorized");
            return Err(err);
        }
    };
    check_origin(state, ctx.origin.as_deref())?;
    validate::validate_request(&payload)?;

    if let Err(err) = check_rate_limit(
        state,
        "track-requests",
        &ctx.client_ip,
        payload.visitor_id.as_deref(),
        &payload.session_id,
        state.config.public_request_rate_limit_requests,
        state.config.public_request_rate_limit_window_seconds,
    ) {
        metrics::record_request_outcome("rate_limited");
        return Err(err);
    }

    if let Some(existing) = load_request_by_key(&state.db, &payload.idempotency_key).await? {
        metrics::record_request_outcome("duplicated");
        return Ok(InsertOutcome::AlreadyExists(existing));
    }

    let merged = validate::merge_request_items(&payload.items);
    let product_ids: Vec<String> = merged.iter().map(|item| item.product_id.clone()).collect();
    let products = state.catalog.load_products(&product_ids).await?;
    let missing: Vec<&str> = product_ids
        .iter()
        .filter(|id| !products.contains_key(*id))
        .map(String::as_str)
        .collect();
    if !missing.is_empty() {
        return Err(ApiError::NotFound(format!(
            "unknown products: {}",
            missing.join(", ")
        )));
    }

    let price_by_id: HashMap<String, Option<i64>> = products
        .iter()
        .map(|(id, product)| (id.clone(), product.price_cents))
        .collect();
    let total_amount_cents = validate::compute_total_cents(&merged, &price_by_id);

    let now = Utc::now();
    let source = validate::normalized_source(&payload.source);
    let request = ProductRequest {
        id: Uuid::new_v4(),
        idempotency_key: payload.idempotency_key.clone(),
        session_id: payload.session_id.clone(),
        visitor_id: payload.visitor_id.clone(),
        status: RequestStatus::Submitted,
        status_reason: None,
        status_updated_by: None,
        status_updated_at: None,
        page_path: payload.page_path.clone(),
        source: source.clone(),
        customer_name: payload.customer_name,
        customer_email: payload.customer_email,
        customer_phone: payload.customer_phone,
        notes: payload.notes,
        utm_source: payload.utm_source.clone(),
        utm_medium: payload.utm_medium.clone(),
        utm_campaign: payload.utm_campaign.clone(),
        referrer: payload.referrer.clone(),
        total_amount_cents,
        created_at: now,
        contacted_at: None,
        paid_at: None,
        delivered_at: None,
        resolved_at: None,
        items: merged
            .into_iter()
            .map(|item| ProductRequestItem {
                product_name: products[&item.product_id].name.clone(),
                unit_price_cents: validate::resolve_unit_price(&item, &price_by_id),
                product_id: item.product_id,
                quantity: item.quantity,
                variant_size: item.variant_size,
                variant_color: item.variant_color,
            })
            .collect(),
        status_history: Vec::new(),
    };

    let correlated_event = AnalyticsEvent {
        id: Uuid::new_v4(),
        event_type: EventType::RequestSubmitted,
        product_id: None,
        catalog_id: None,
        request_id: Some(request.id.to_string()),
        page_path: payload.page_path,
        source,
        session_id: payload.session_id,
        visitor_id: payload.visitor_id,
        idempotency_key: None,
        key_id: key_id.clone(),
        occurred_at: now,
        received_at: now,
        utm_source: payload.utm_source,
        utm_medium: payload.utm_medium,
        utm_campaign: payload.utm_campaign,
        referrer: payload.referrer,
    };

    match insert_request(&state.db, &request, &correlated_event).await? {
        InsertOutcome::AlreadyExists(existing) => {
            metrics::record_request_outcome("duplicated");
            Ok(InsertOutcome::AlreadyExists(existing))
        }
        InsertOutcome::Inserted(request) => {
            state
                .audit
                .record(
                    key_id.as_deref(),
                    None,
                    "product_request",
                    &request.id.to_string(),
                    "create",
                    None,
                    Some(snapshot(&request)),
                )
                .await?;
            metrics::record_request_outcome("ingested");
            tracing::info!(
                client_ip = %ctx.client_ip,
                correlation = ?ctx.correlation_id,
                request_id = %request.id,
                items = request.items.len(),
                "request submitted"
            );
            Ok(InsertOutcome::Inserted(request))
        }
    }
}

// === Persistence ===

const INSERT_EVENT_SQL: &str = r#"
    INSERT INTO analytics_events (
        id, event_type, product_id, catalog_id, request_id, page_path, source,
        session_id, visitor_id, idempotency_key, key_id, occurred_at, received_at,
        utm_source, utm_medium, utm_campaign, referrer
    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
"#;

async fn insert_event_row<'e, E>(executor: E, event: &AnalyticsEvent) -> Result<(), sqlx::Error>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    sqlx::query(INSERT_EVENT_SQL)
        .bind(event.id.to_string())
        .bind(event.event_type.as_str())
        .bind(&event.product_id)
        .bind(&event.catalog_id)
        .bind(&event.request_id)
        .bind(&event.page_path)
        .bind(&event.source)
        .bind(&event.session_id)
        .bind(&event.visitor_id)
        .bind(&event.idempotency_key)
        .bind(&event.key_id)
        .bind(event.occurred_at.to_rfc3339())
        .bind(event.received_at.to_rfc3339())
        .bind(&event.utm_source)
        .bind(&event.utm_medium)
        .bind(&event.utm_campaign)
        .bind(&event.referrer)
        .execute(executor)
        .await?;
    Ok(())
}

/// Insert an event, resolving an idempotency-key collision to the existing
/// row. The unique-violation handling lives here so callers only ever see
/// the tagged outcome.
pub async fn insert_event(
    db: &SqlitePool,
    event: &AnalyticsEvent,
) -> Result<InsertOutcome<AnalyticsEvent>, sqlx::Error> {
    match insert_event_row(db, event).await {
        Ok(()) => Ok(InsertOutcome::Inserted(event.clone())),
        Err(err) if is_unique_violation(&err) => {
            let Some(key) = event.idempotency_key.as_deref() else {
                return Err(err);
            };
            match load_event_by_key(db, key).await? {
                Some(existing) => Ok(InsertOutcome::AlreadyExists(existing)),
                None => Err(err),
            }
        }
        Err(err) => Err(err),
    }
}

/// Insert a request plus its items and the correlated submission event in
/// one transaction, with the same collision contract as [`insert_event`].
pub async fn insert_request(
    db: &SqlitePool,
    request: &ProductRequest,
    correlated_event: &AnalyticsEvent,
) -> Result<InsertOutcome<ProductRequest>, sqlx::Error> {
    match insert_request_tx(db, request, correlated_event).await {
        Ok(()) => Ok(InsertOutcome::Inserted(request.clone())),
        Err(err) if is_unique_violation(&err) => {
            match load_request_by_key(db, &request.idempotency_key).await? {
                Some(existing) => Ok(InsertOutcome::AlreadyExists(existing)),
                None => Err(err),
            }
        }
        Err(err) => Err(err),
    }
}

async fn insert_request_tx(
    db: &SqlitePool,
    request: &ProductRequest,
    correlated_event: &AnalyticsEvent,
) -> Result<(), sqlx::Error> {
    let mut tx = db.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO product_requests (
            id, idempotency_key, session_id, visitor_id, status, status_reason,
            status_updated_by, status_updated_at, page_path, source, customer_name,
            customer_email, customer_phone, notes, utm_source, utm_medium,
            utm_campaign, referrer, total_amount_cents, created_at, contacted_at,
            paid_at, delivered_at, resolved_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(request.id.to_string())
    .bind(&request.idempotency_key)
    .bind(&request.session_id)
    .bind(&request.visitor_id)
    .bind(lifecycle::to_storage(request.status))
    .bind(&request.status_reason)
    .bind(&request.status_updated_by)
    .bind(request.status_updated_at.map(|t| t.to_rfc3339()))
    .bind(&request.page_path)
    .bind(&request.source)
    .bind(&request.customer_name)
    .bind(&request.customer_email)
    .bind(&request.customer_phone)
    .bind(&request.notes)
    .bind(&request.utm_source)
    .bind(&request.utm_medium)
    .bind(&request.utm_campaign)
    .bind(&request.referrer)
    .bind(request.total_amount_cents)
    .bind(request.created_at.to_rfc3339())
    .bind(request.contacted_at.map(|t| t.to_rfc3339()))
    .bind(request.paid_at.map(|t| t.to_rfc3339()))
    .bind(request.delivered_at.map(|t| t.to_rfc3339()))
    .bind(request.resolved_at.map(|t| t.to_rfc3339()))
    .execute(&mut *tx)
    .await?;

    for item in &request.items {
        sqlx::query(
            r#"
            INSERT INTO product_request_items (
                request_id, product_id, product_name, quantity, variant_size,
                variant_color, unit_price_cents
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(request.id.to_string())
        .bind(&item.product_id)
        .bind(&item.product_name)
        .bind(item.quantity)
        .bind(&item.variant_size)
        .bind(&item.variant_color)
        .bind(item.unit_price_cents)
        .execute(&mut *tx)
        .await?;
    }

    insert_event_row(&mut *tx, correlated_event).await?;

    tx.commit().await?;
    Ok(())
}

/// Persist an in-memory lifecycle transition: the updated request row plus,
/// when the stored status changed, its newest history entry, atomically.
pub async fn persist_transition(
    db: &SqlitePool,
    request: &ProductRequest,
    changed: bool,
) -> Result<(), sqlx::Error> {
    let mut tx = db.begin().await?;

    sqlx::query(
        r#"
        UPDATE product_requests SET
            status = ?, status_reason = ?, status_updated_by = ?, status_updated_at = ?,
            notes = ?, contacted_at = ?, paid_at = ?, delivered_at = ?, resolved_at = ?
        WHERE id = ?
        "#,
    )
    .bind(lifecycle::to_storage(request.status))
    .bind(&request.status_reason)
    .bind(&request.status_updated_by)
    .bind(request.status_updated_at.map(|t| t.to_rfc3339()))
    .bind(&request.notes)
    .bind(request.contacted_at.map(|t| t.to_rfc3339()))
    .bind(request.paid_at.map(|t| t.to_rfc3339()))
    .bind(request.delivered_at.map(|t| t.to_rfc3339()))
    .bind(request.resolved_at.map(|t| t.to_rfc3339()))
    .bind(request.id.to_string())
    .execute(&mut *tx)
    .await?;

    if changed {
        if let Some(entry) = request.status_history.last() {
            sqlx::query(
                r#"
                INSERT INTO product_request_status_history (
                    request_id, previous_status, new_status, reason, changed_by, changed_at
                ) VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(request.id.to_string())
            .bind(entry.previous_status.as_str())
            .bind(entry.new_status.as_str())
            .bind(&entry.reason)
            .bind(&entry.changed_by)
            .bind(entry.changed_at.to_rfc3339())
            .execute(&mut *tx)
            .await?;
        }
    }

    tx.commit().await?;
    Ok(())
}

// === Row mapping ===

fn decode_err<E>(err: E) -> sqlx::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    sqlx::Error::Decode(Box::new(err))
}

fn parse_datetime(value: String) -> Result<DateTime<Utc>, sqlx::Error> {
    value.parse::<DateTime<Utc>>().map_err(decode_err)
}

fn parse_opt_datetime(value: Option<String>) -> Result<Option<DateTime<Utc>>, sqlx::Error> {
    value.map(parse_datetime).transpose()
}

fn event_from_row(row: &SqliteRow) -> Result<AnalyticsEvent, sqlx::Error> {
    let id: String = row.try_get("id")?;
    let event_type: String = row.try_get("event_type")?;
    Ok(AnalyticsEvent {
        id: id.parse::<Uuid>().map_err(decode_err)?,
        event_type: EventType::parse_str(&event_type).ok_or_else(|| {
            sqlx::Error::Decode(format!("unknown event type: {event_type}").into())
        })?,
        product_id: row.try_get("product_id")?,
        catalog_id: row.try_get("catalog_id")?,
        request_id: row.try_get("request_id")?,
        page_path: row.try_get("page_path")?,
        source: row.try_get("source")?,
        session_id: row.try_get("session_id")?,
        visitor_id: row.try_get("visitor_id")?,
        idempotency_key: row.try_get("idempotency_key")?,
        key_id: row.try_get("key_id")?,
        occurred_at: parse_datetime(row.try_get("occurred_at")?)?,
        received_at: parse_datetime(row.try_get("received_at")?)?,
        utm_source: row.try_get("utm_source")?,
        utm_medium: row.try_get("utm_medium")?,
        utm_campaign: row.try_get("utm_campaign")?,
        referrer: row.try_get("referrer")?,
    })
}

fn request_from_row(row: &SqliteRow) -> Result<ProductRequest, sqlx::Error> {
    let id: String = row.try_get("id")?;
    let status: String = row.try_get("status")?;
    Ok(ProductRequest {
        id: id.parse::<Uuid>().map_err(decode_err)?,
        idempotency_key: row.try_get("idempotency_key")?,
        session_id: row.try_get("session_id")?,
        visitor_id: row.try_get("visitor_id")?,
        status: lifecycle::to_canonical(&status)
            .ok_or_else(|| sqlx::Error::Decode(format!("unknown status: {status}").into()))?,
        status_reason: row.try_get("status_reason")?,
        status_updated_by: row.try_get("status_updated_by")?,
        status_updated_at: parse_opt_datetime(row.try_get("status_updated_at")?)?,
        page_path: row.try_get("page_path")?,
        source: row.try_get("source")?,
        customer_name: row.try_get("customer_name")?,
        customer_email: row.try_get("customer_email")?,
        customer_phone: row.try_get("customer_phone")?,
        notes: row.try_get("notes")?,
        utm_source: row.try_get("utm_source")?,
        utm_medium: row.try_get("utm_medium")?,
        utm_campaign: row.try_get("utm_campaign")?,
        referrer: row.try_get("referrer")?,
        total_amount_cents: row.try_get("total_amount_cents")?,
        created_at: parse_datetime(row.try_get("created_at")?)?,
        contacted_at: parse_opt_datetime(row.try_get("contacted_at")?)?,
        paid_at: parse_opt_datetime(row.try_get("paid_at")?)?,
        delivered_at: parse_opt_datetime(row.try_get("delivered_at")?)?,
        resolved_at: parse_opt_datetime(row.try_get("resolved_at")?)?,
        items: Vec::new(),
        status_history: Vec::new(),
    })
}

pub async fn load_event_by_key(
    db: &SqlitePool,
    idempotency_key: &str,
) -> Result<Option<AnalyticsEvent>, sqlx::Error> {
    let row = sqlx::query("SELECT * FROM analytics_events WHERE idempotency_key = ?")
        .bind(idempotency_key)
        .fetch_optional(db)
        .await?;
    row.as_ref().map(event_from_row).transpose()
}

async fn load_request_children(
    db: &SqlitePool,
    request: &mut ProductRequest,
) -> Result<(), sqlx::Error> {
    let request_id = request.id.to_string();

    let items = sqlx::query_as::<_, (String, String, i64, Option<String>, Option<String>, Option<i64>)>(
        "SELECT product_id, product_name, quantity, variant_size, variant_color, unit_price_cents
         FROM product_request_items WHERE request_id = ? ORDER BY id",
    )
    .bind(&request_id)
    .fetch_all(db)
    .await?;
    request.items = items
        .into_iter()
        .map(
            |(product_id, product_name, quantity, variant_size, variant_color, unit_price_cents)| {
                ProductRequestItem {
                    product_id,
                    product_name,
                    quantity,
                    variant_size,
                    variant_color,
                    unit_price_cents,
                }
            },
        )
        .collect();

    let history = sqlx::query_as::<_, (String, String, Option<String>, String, String)>(
        "SELECT previous_status, new_status, reason, changed_by, changed_at
         FROM product_request_status_history WHERE request_id = ? ORDER BY id",
    )
    .bind(&request_id)
    .fetch_all(db)
    .await?;
    request.status_history = history
        .into_iter()
        .filter_map(|(previous, new, reason, changed_by, changed_at)| {
            Some(StatusHistoryEntry {
                previous_status: RequestStatus::parse_str(&previous)?,
                new_status: RequestStatus::parse_str(&new)?,
                reason,
                changed_by,
                changed_at: changed_at.parse().ok()?,
            })
        })
        .collect();

    Ok(())
}

pub async fn load_request_by_key(
    db: &SqlitePool,
    idempotency_key: &str,
) -> Result<Option<ProductRequest>, sqlx::Error> {
    let row = sqlx::query("SELECT * FROM product_requests WHERE idempotency_key = ?")
        .bind(idempotency_key)
        .fetch_optional(db)
        .await?;
    let Some(mut request) = row.as_ref().map(request_from_row).transpose()? else {
        return Ok(None);
    };
    load_request_children(db, &mut request).await?;
    Ok(Some(request))
}

pub async fn load_request(
    db: &SqlitePool,
    id: &str,
) -> Result<Option<ProductRequest>, sqlx::Error> {
    let row = sqlx::query("SELECT * FROM product_requests WHERE id = ?")
        .bind(id)
        .fetch_optional(db)
        .await?;
    let Some(mut request) = row.as_ref().map(request_from_row).transpose()? else {
        return Ok(None);
    };
    load_request_children(db, &mut request).await?;
    Ok(Some(request))
}
