//! Payload validation and line-item arithmetic
//!
//! Visitor, session and idempotency identifiers are caller-supplied opaque
//! tokens; they are constrained to a fixed shape so they can safely feed
//! rate-limit keys and unique indexes.

use std::collections::HashMap;

use crate::error::VitrinaError;
use crate::types::{EventType, RequestItemPayload, StatusUpdatePayload, TrackEventPayload, TrackRequestPayload};

/// Alphanumeric head, then alphanumeric or `. _ : -`, 8 to 120 chars total.
pub fn is_valid_tracking_id(value: &str) -> bool {
    if value.len() < 8 || value.len() > 120 {
        return false;
    }
    let mut chars = value.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphanumeric() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | ':' | '-'))
}

/// Leading slash, no whitespace, at most 255 chars.
pub fn is_valid_page_path(value: &str) -> bool {
    value.starts_with('/') && value.len() <= 255 && !value.chars().any(|c| c.is_whitespace())
}

/// Product/catalog/request references are 36-char UUID strings.
pub fn is_valid_reference_id(value: &str) -> bool {
    value.len() == 36
}

pub fn normalized_source(raw: &str) -> String {
    raw.trim().to_ascii_lowercase()
}

fn fail(message: impl Into<String>) -> VitrinaError {
    VitrinaError::Validation(message.into())
}

fn check_tracking_id(field: &str, value: &str) -> Result<(), VitrinaError> {
    if is_valid_tracking_id(value) {
        Ok(())
    } else {
        Err(fail(format!("{field} must be 8-120 chars of [A-Za-z0-9._:-] starting alphanumeric")))
    }
}

fn check_optional_len(field: &str, value: Option<&str>, max: usize) -> Result<(), VitrinaError> {
    match value {
        Some(value) if value.len() > max => Err(fail(format!("{field} must be at most {max} chars"))),
        _ => Ok(()),
    }
}

fn check_reference(field: &str, value: Option<&str>) -> Result<(), VitrinaError> {
    match value {
        Some(value) if !is_valid_reference_id(value) => {
            Err(fail(format!("{field} must be a 36-char id")))
        }
        _ => Ok(()),
    }
}

fn check_common_tracking_fields(
    session_id: &str,
    visitor_id: Option<&str>,
    page_path: &str,
    source: &str,
) -> Result<(), VitrinaError> {
    check_tracking_id("session_id", session_id)?;
    if let Some(visitor_id) = visitor_id {
        check_tracking_id("visitor_id", visitor_id)?;
    }
    if !is_valid_page_path(page_path) {
        return Err(fail("page_path must start with '/' and contain no whitespace"));
    }
    if normalized_source(source).is_empty() {
        return Err(fail("source must not be empty"));
    }
    if source.len() > 255 {
        return Err(fail("source must be at most 255 chars"));
    }
    Ok(())
}

fn check_utm_fields(
    utm_source: Option<&str>,
    utm_medium: Option<&str>,
    utm_campaign: Option<&str>,
    referrer: Option<&str>,
) -> Result<(), VitrinaError> {
    check_optional_len("utm_source", utm_source, 120)?;
    check_optional_len("utm_medium", utm_medium, 120)?;
    check_optional_len("utm_campaign", utm_campaign, 120)?;
    check_optional_len("referrer", referrer, 512)?;
    Ok(())
}

/// Validates an event payload. Public submissions must carry an idempotency
/// key; operator submissions may omit it.
pub fn validate_event(
    payload: &TrackEventPayload,
    idempotency_required: bool,
) -> Result<(), VitrinaError> {
    check_common_tracking_fields(
        &payload.session_id,
        payload.visitor_id.as_deref(),
        &payload.page_path,
        &payload.source,
    )?;
    match payload.idempotency_key.as_deref() {
        Some(key) => check_tracking_id("idempotency_key", key)?,
        None if idempotency_required => return Err(fail("idempotency_key is required")),
        None => {}
    }
    check_reference("product_id", payload.product_id.as_deref())?;
    check_reference("catalog_id", payload.catalog_id.as_deref())?;
    check_reference("request_id", payload.request_id.as_deref())?;
    check_utm_fields(
        payload.utm_source.as_deref(),
        payload.utm_medium.as_deref(),
        payload.utm_campaign.as_deref(),
        payload.referrer.as_deref(),
    )?;

    // attribution targets per event kind
    match payload.event_type {
        EventType::RequestSubmitted if payload.request_id.is_none() => {
            Err(fail("request_submitted requires request_id"))
        }
        EventType::AddToRequest if payload.product_id.is_none() => {
            Err(fail("add_to_request requires product_id"))
        }
        EventType::Impression | EventType::Click
            if payload.product_id.is_none() && payload.catalog_id.is_none() =>
        {
            Err(fail("impression/click requires product_id or catalog_id"))
        }
        _ => Ok(()),
    }
}

pub fn validate_request(payload: &TrackRequestPayload) -> Result<(), VitrinaError> {
    check_tracking_id("idempotency_key", &payload.idempotency_key)?;
    check_common_tracking_fields(
        &payload.session_id,
        payload.visitor_id.as_deref(),
        &payload.page_path,
        &payload.source,
    )?;
    if let Some(name) = payload.customer_name.as_deref() {
        if name.len() < 2 || name.len() > 160 {
            return Err(fail("customer_name must be 2-160 chars"));
        }
    }
    check_optional_len("customer_email", payload.customer_email.as_deref(), 160)?;
    check_optional_len("customer_phone", payload.customer_phone.as_deref(), 60)?;
    check_optional_len("notes", payload.notes.as_deref(), 4000)?;
    check_utm_fields(
        payload.utm_source.as_deref(),
        payload.utm_medium.as_deref(),
        payload.utm_campaign.as_deref(),
        payload.referrer.as_deref(),
    )?;

    if payload.items.is_empty() || payload.items.len() > 50 {
        return Err(fail("items must contain 1-50 entries"));
    }
    for item in &payload.items {
        if !is_valid_reference_id(&item.product_id) {
            return Err(fail("item product_id must be a 36-char id"));
        }
        if item.quantity < 1 || item.quantity > 200 {
            return Err(fail("item quantity must be 1-200"));
        }
        check_optional_len("variant_size", item.variant_size.as_deref(), 40)?;
        check_optional_len("variant_color", item.variant_color.as_deref(), 60)?;
        if matches!(item.unit_price_cents, Some(price) if price < 0) {
            return Err(fail("unit_price_cents must not be negative"));
        }
    }
    Ok(())
}

pub fn validate_status_update(payload: &StatusUpdatePayload) -> Result<(), VitrinaError> {
    if payload.status.is_declined() && reason_is_blank(payload.reason.as_deref()) {
        return Err(VitrinaError::ReasonRequired(payload.status.as_str().to_string()));
    }
    check_optional_len("reason", payload.reason.as_deref(), 4000)?;
    check_optional_len("notes", payload.notes.as_deref(), 4000)?;
    Ok(())
}

fn reason_is_blank(reason: Option<&str>) -> bool {
    reason.map(|r| r.trim().is_empty()).unwrap_or(true)
}

/// One line of a request after merging duplicate product rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedItem {
    pub product_id: String,
    pub quantity: i64,
    pub variant_size: Option<String>,
    pub variant_color: Option<String>,
    pub unit_price_cents: Option<i64>,
    /// Merged rows disagreed on the price. A conflicted price stays null
    /// and is never backfilled from the catalog.
    pub price_conflict: bool,
}

fn normalized_variant(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

/// Groups submitted items by product, summing quantities. When merged rows
/// disagree on a variant attribute or unit price, that field becomes null
/// rather than silently picking one side. First-seen order is preserved.
pub fn merge_request_items(items: &[RequestItemPayload]) -> Vec<MergedItem> {
    let mut merged: Vec<MergedItem> = Vec::new();
    for item in items {
        let variant_size = normalized_variant(item.variant_size.as_deref());
        let variant_color = normalized_variant(item.variant_color.as_deref());
        if let Some(existing) = merged.iter_mut().find(|m| m.product_id == item.product_id) {
            existing.quantity += item.quantity;
            if existing.variant_size != variant_size {
                existing.variant_size = None;
            }
            if existing.variant_color != variant_color {
                existing.variant_color = None;
            }
            if existing.price_conflict || existing.unit_price_cents != item.unit_price_cents {
                existing.unit_price_cents = None;
                existing.price_conflict = true;
            }
        } else {
            merged.push(MergedItem {
                product_id: item.product_id.clone(),
                quantity: item.quantity,
                variant_size,
                variant_color,
                unit_price_cents: item.unit_price_cents,
                price_conflict: false,
            });
        }
    }
    merged
}

/// Resolved unit price for one merged item: the caller-supplied price wins,
/// the current catalog price is the fallback, and a price conflict resolves
/// to nothing at all.
pub fn resolve_unit_price(
    item: &MergedItem,
    catalog_price_by_id: &HashMap<String, Option<i64>>,
) -> Option<i64> {
    if item.price_conflict {
        return None;
    }
    item.unit_price_cents
        .or_else(|| catalog_price_by_id.get(&item.product_id).copied().flatten())
}

/// Total of `resolved unit price x quantity` across all items. Any item
/// without a resolvable price makes the whole total `None` rather than
/// partially wrong.
pub fn compute_total_cents(
    items: &[MergedItem],
    catalog_price_by_id: &HashMap<String, Option<i64>>,
) -> Option<i64> {
    let mut total: i64 = 0;
    for item in items {
        let unit = resolve_unit_price(item, catalog_price_by_id)?;
        total += unit * item.quantity;
    }
    Some(total)
}
