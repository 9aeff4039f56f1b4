//! Request fulfillment lifecycle
//!
//! The canonical state machine is `submitted -> paid -> {fulfilled |
//! declined_customer | declined_business}`. Terminal states accept nothing
//! but same-state no-ops. A feature-gated reopening transition back to
//! `submitted` exists for operators and always requires a reason.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::VitrinaError;
use crate::types::{ProductRequest, StatusHistoryEntry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Submitted,
    Paid,
    Fulfilled,
    DeclinedCustomer,
    DeclinedBusiness,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Submitted => "submitted",
            RequestStatus::Paid => "paid",
            RequestStatus::Fulfilled => "fulfilled",
            RequestStatus::DeclinedCustomer => "declined_customer",
            RequestStatus::DeclinedBusiness => "declined_business",
        }
    }

    pub fn parse_str(value: &str) -> Option<Self> {
        match value {
            "submitted" => Some(RequestStatus::Submitted),
            "paid" => Some(RequestStatus::Paid),
            "fulfilled" => Some(RequestStatus::Fulfilled),
            "declined_customer" => Some(RequestStatus::DeclinedCustomer),
            "declined_business" => Some(RequestStatus::DeclinedBusiness),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RequestStatus::Fulfilled
                | RequestStatus::DeclinedCustomer
                | RequestStatus::DeclinedBusiness
        )
    }

    pub fn is_declined(&self) -> bool {
        matches!(
            self,
            RequestStatus::DeclinedCustomer | RequestStatus::DeclinedBusiness
        )
    }
}

/// Storage encoding for a canonical status.
///
/// External consumers of the persisted rows predate the `paid` vocabulary
/// and still read the legacy `contacted` value, so `paid` is stored under
/// that name. This mapping and [`to_canonical`] are the only places the two
/// vocabularies meet.
pub fn to_storage(status: RequestStatus) -> &'static str {
    match status {
        RequestStatus::Paid => "contacted",
        other => other.as_str(),
    }
}

/// Inverse of [`to_storage`].
pub fn to_canonical(value: &str) -> Option<RequestStatus> {
    match value {
        "contacted" => Some(RequestStatus::Paid),
        other => RequestStatus::parse_str(other),
    }
}

/// One operator-initiated status change.
#[derive(Debug, Clone)]
pub struct Transition {
    pub target: RequestStatus,
    pub reason: Option<String>,
    pub actor: String,
}

#[derive(Debug, Clone, Copy)]
pub struct TransitionOutcome {
    /// True when the stored status value changed; in that case one history
    /// entry has been appended to the request.
    pub changed: bool,
}

fn is_forward_edge(from: RequestStatus, to: RequestStatus) -> bool {
    use RequestStatus::*;
    matches!(
        (from, to),
        (Submitted, Paid) | (Paid, Fulfilled) | (Paid, DeclinedCustomer) | (Paid, DeclinedBusiness)
    )
}

/// Validates and applies `transition` to `request` in memory.
///
/// Nothing is mutated unless the transition is accepted. A no-op (target
/// equals current status) is accepted idempotently: it re-stamps the actor
/// and reason but appends no history.
pub fn apply_transition(
    request: &mut ProductRequest,
    transition: Transition,
    allow_reopen: bool,
    now: DateTime<Utc>,
) -> Result<TransitionOutcome, VitrinaError> {
    let from = request.status;
    let to = transition.target;

    if to.is_declined() && transition.reason.is_none() {
        return Err(VitrinaError::ReasonRequired(to.as_str().to_string()));
    }

    if from == to {
        if let Some(reason) = transition.reason {
            request.status_reason = Some(reason);
        }
        request.status_updated_by = Some(transition.actor);
        request.status_updated_at = Some(now);
        return Ok(TransitionOutcome { changed: false });
    }

    if to == RequestStatus::Submitted {
        if !allow_reopen {
            return Err(VitrinaError::ReopenDisabled);
        }
        if transition.reason.is_none() {
            return Err(VitrinaError::ReasonRequired(to.as_str().to_string()));
        }
    } else if !is_forward_edge(from, to) {
        return Err(VitrinaError::InvalidTransition {
            from: from.as_str().to_string(),
            to: to.as_str().to_string(),
        });
    }

    apply_side_effects(request, to, now);

    request.status = to;
    request.status_reason = transition.reason.clone();
    request.status_updated_by = Some(transition.actor.clone());
    request.status_updated_at = Some(now);
    request.status_history.push(StatusHistoryEntry {
        previous_status: from,
        new_status: to,
        reason: transition.reason,
        changed_by: transition.actor,
        changed_at: now,
    });

    Ok(TransitionOutcome { changed: true })
}

fn apply_side_effects(request: &mut ProductRequest, target: RequestStatus, now: DateTime<Utc>) {
    match target {
        RequestStatus::Submitted => {
            request.contacted_at = None;
            request.paid_at = None;
            request.delivered_at = None;
            request.resolved_at = None;
        }
        RequestStatus::Paid => {
            if request.contacted_at.is_none() {
                request.contacted_at = Some(now);
            }
            if request.paid_at.is_none() {
                request.paid_at = Some(now);
            }
            request.delivered_at = None;
            request.resolved_at = None;
        }
        RequestStatus::Fulfilled => {
            if request.contacted_at.is_none() {
                request.contacted_at = Some(now);
            }
            if request.paid_at.is_none() {
                request.paid_at = Some(now);
            }
            request.delivered_at = Some(now);
            request.resolved_at = Some(now);
        }
        RequestStatus::DeclinedCustomer | RequestStatus::DeclinedBusiness => {
            if request.contacted_at.is_none() {
                request.contacted_at = Some(now);
            }
            request.delivered_at = None;
            request.resolved_at = Some(now);
        }
    }
}
