//! API error taxonomy
//!
//! Every failure the gateway can surface maps to exactly one status code.
//! Internal errors are logged with full detail and returned as a generic
//! message.

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use vitrina_core::VitrinaError;

pub type AppResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid or missing write key")]
    Unauthorized,

    #[error("origin not allowed")]
    Forbidden,

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Conflict(String),

    #[error("rate limit exceeded")]
    RateLimited { retry_after: u64 },

    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            ApiError::Unauthorized => "unauthorized",
            ApiError::Forbidden => "forbidden",
            ApiError::NotFound(_) => "not_found",
            ApiError::Validation(_) => "validation_error",
            ApiError::Conflict(_) => "conflict",
            ApiError::RateLimited { .. } => "rate_limited",
            ApiError::Internal(_) => "internal_error",
        }
    }
}

impl From<VitrinaError> for ApiError {
    fn from(err: VitrinaError) -> Self {
        match err {
            VitrinaError::Validation(_) | VitrinaError::ReasonRequired(_) => {
                ApiError::Validation(err.to_string())
            }
            VitrinaError::InvalidTransition { .. } | VitrinaError::ReopenDisabled => {
                ApiError::Conflict(err.to_string())
            }
        }
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        ApiError::Internal(err.into())
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    retry_after: Option<u64>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.error_code();
        let (message, retry_after) = match &self {
            ApiError::Internal(err) => {
                tracing::error!("internal error: {err:#}");
                ("an internal error occurred".to_string(), None)
            }
            ApiError::RateLimited { retry_after } => (self.to_string(), Some(*retry_after)),
            other => (other.to_string(), None),
        };

        let body = Json(ErrorBody {
            error: message,
            code,
            retry_after,
        });
        match retry_after {
            Some(secs) => (status, [(header::RETRY_AFTER, secs.to_string())], body).into_response(),
            None => (status, body).into_response(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taxonomy_maps_to_expected_status_codes() {
        assert_eq!(ApiError::Unauthorized.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::Forbidden.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(
            ApiError::NotFound("x".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::Conflict("x".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::RateLimited { retry_after: 3 }.status_code(),
            StatusCode::TOO_MANY_REQUESTS
        );
    }

    #[test]
    fn transition_errors_become_conflicts() {
        let err: ApiError = VitrinaError::InvalidTransition {
            from: "fulfilled".into(),
            to: "paid".into(),
        }
        .into();
        assert!(matches!(err, ApiError::Conflict(_)));
        assert!(err.to_string().contains("fulfilled -> paid"));
    }
}
