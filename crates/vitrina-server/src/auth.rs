//! Operator authentication
//!
//! Tokens are issued by the external identity provider; this service only
//! verifies them and hands the actor identity to handlers for audit
//! attribution.

use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::ApiError;
use crate::state::AppState;

/// JWT claims: the opaque operator identity this service consumes.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,
    pub name: String,
    pub role: String,
    pub exp: i64,
    pub iat: i64,
}

/// Auth error response
#[derive(Serialize)]
pub struct AuthError {
    pub error: String,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        (StatusCode::UNAUTHORIZED, Json(self)).into_response()
    }
}

/// Verify a bearer token.
pub fn verify_token(token: &str, secret: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    // Explicitly require HS256 to prevent algorithm confusion attacks
    let mut validation = Validation::new(jsonwebtoken::Algorithm::HS256);
    validation.validate_exp = true;

    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )?;

    Ok(token_data.claims)
}

/// Mint a token in the identity provider's format. The server never issues
/// tokens in production; tests and local tooling use this.
pub fn create_token(
    sub: &str,
    name: &str,
    role: &str,
    secret: &str,
) -> Result<String, jsonwebtoken::errors::Error> {
    let now = Utc::now();
    let claims = Claims {
        sub: sub.to_string(),
        name: name.to_string(),
        role: role.to_string(),
        exp: (now + Duration::hours(1)).timestamp(),
        iat: now.timestamp(),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}

/// Auth middleware - validates the bearer JWT and exposes Claims
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    let claims = match auth_header {
        Some(header) if header.starts_with("Bearer ") => {
            verify_token(&header[7..], &state.config.jwt_secret).map_err(|_| AuthError {
                error: "Invalid token".to_string(),
            })?
        }
        _ => {
            return Err(AuthError {
                error: "Missing authorization".to_string(),
            })
        }
    };

    request.extensions_mut().insert(claims);

    Ok(next.run(request).await)
}

/// Operator endpoints are restricted to the admin and editor roles.
pub fn require_operator(claims: &Claims) -> Result<(), ApiError> {
    match claims.role.as_str() {
        "admin" | "editor" => Ok(()),
        _ => Err(ApiError::Forbidden),
    }
}
