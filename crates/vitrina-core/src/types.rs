//! Core types for the Vitrina tracking and request API

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::lifecycle::RequestStatus;

/// Kind of behavioral event accepted by the ingestion endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Impression,
    Click,
    CtaClick,
    AddToRequest,
    RequestSubmitted,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Impression => "impression",
            EventType::Click => "click",
            EventType::CtaClick => "cta_click",
            EventType::AddToRequest => "add_to_request",
            EventType::RequestSubmitted => "request_submitted",
        }
    }

    pub fn parse_str(value: &str) -> Option<Self> {
        match value {
            "impression" => Some(EventType::Impression),
            "click" => Some(EventType::Click),
            "cta_click" => Some(EventType::CtaClick),
            "add_to_request" => Some(EventType::AddToRequest),
            "request_submitted" => Some(EventType::RequestSubmitted),
            _ => None,
        }
    }
}

/// A single behavioral tracking event. Immutable once persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsEvent {
    pub id: Uuid,
    pub event_type: EventType,
    pub product_id: Option<String>,
    pub catalog_id: Option<String>,
    pub request_id: Option<String>,
    pub page_path: String,
    pub source: String,
    pub session_id: String,
    pub visitor_id: Option<String>,
    /// Globally unique when present; a retry carrying the same key maps to
    /// the original row instead of creating a duplicate.
    pub idempotency_key: Option<String>,
    /// Which write key authenticated the submission, if it came through the
    /// public endpoint.
    pub key_id: Option<String>,
    /// When the event happened according to the caller (server time if the
    /// caller did not say).
    pub occurred_at: DateTime<Utc>,
    /// When the server accepted the event.
    pub received_at: DateTime<Utc>,
    pub utm_source: Option<String>,
    pub utm_medium: Option<String>,
    pub utm_campaign: Option<String>,
    pub referrer: Option<String>,
}

/// A customer purchase-intent request and its line items.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductRequest {
    pub id: Uuid,
    pub idempotency_key: String,
    pub session_id: String,
    pub visitor_id: Option<String>,
    pub status: RequestStatus,
    pub status_reason: Option<String>,
    pub status_updated_by: Option<String>,
    pub status_updated_at: Option<DateTime<Utc>>,
    pub page_path: String,
    pub source: String,
    pub customer_name: Option<String>,
    pub customer_email: Option<String>,
    pub customer_phone: Option<String>,
    pub notes: Option<String>,
    pub utm_source: Option<String>,
    pub utm_medium: Option<String>,
    pub utm_campaign: Option<String>,
    pub referrer: Option<String>,
    /// Null whenever any line item's unit price could not be resolved.
    pub total_amount_cents: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub contacted_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub items: Vec<ProductRequestItem>,
    pub status_history: Vec<StatusHistoryEntry>,
}

/// One requested product line, with name and price snapshotted at
/// submission time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductRequestItem {
    pub product_id: String,
    pub product_name: String,
    pub quantity: i64,
    pub variant_size: Option<String>,
    pub variant_color: Option<String>,
    pub unit_price_cents: Option<i64>,
}

/// Append-only record of one status change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusHistoryEntry {
    pub previous_status: RequestStatus,
    pub new_status: RequestStatus,
    pub reason: Option<String>,
    pub changed_by: String,
    pub changed_at: DateTime<Utc>,
}

/// Process-lifetime tallies for the public event ingestion path.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct IngestionMetrics {
    pub total: u64,
    pub ingested: u64,
    pub duplicated: u64,
    pub rate_limited: u64,
    pub unauthorized: u64,
}

// === Wire payloads ===

#[derive(Debug, Clone, Deserialize)]
pub struct TrackEventPayload {
    pub event_type: EventType,
    #[serde(default)]
    pub product_id: Option<String>,
    #[serde(default)]
    pub catalog_id: Option<String>,
    #[serde(default)]
    pub request_id: Option<String>,
    pub page_path: String,
    pub source: String,
    pub session_id: String,
    #[serde(default)]
    pub visitor_id: Option<String>,
    #[serde(default)]
    pub idempotency_key: Option<String>,
    #[serde(default)]
    pub occurred_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub utm_source: Option<String>,
    #[serde(default)]
    pub utm_medium: Option<String>,
    #[serde(default)]
    pub utm_campaign: Option<String>,
    #[serde(default)]
    pub referrer: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RequestItemPayload {
    pub product_id: String,
    #[serde(default = "default_quantity")]
    pub quantity: i64,
    #[serde(default)]
    pub variant_size: Option<String>,
    #[serde(default)]
    pub variant_color: Option<String>,
    #[serde(default)]
    pub unit_price_cents: Option<i64>,
}

fn default_quantity() -> i64 {
    1
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrackRequestPayload {
    pub idempotency_key: String,
    pub session_id: String,
    #[serde(default)]
    pub visitor_id: Option<String>,
    pub page_path: String,
    pub source: String,
    #[serde(default)]
    pub customer_name: Option<String>,
    #[serde(default)]
    pub customer_email: Option<String>,
    #[serde(default)]
    pub customer_phone: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub utm_source: Option<String>,
    #[serde(default)]
    pub utm_medium: Option<String>,
    #[serde(default)]
    pub utm_campaign: Option<String>,
    #[serde(default)]
    pub referrer: Option<String>,
    pub items: Vec<RequestItemPayload>,
}

/// Operator command to advance a request through its lifecycle.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusUpdatePayload {
    pub status: RequestStatus,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}
