//! Runtime configuration
//!
//! Every knob is read from the environment exactly once at startup and
//! injected into component constructors; nothing consults env vars per
//! request.

use anyhow::{Context, Result};

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub database_url: String,
    /// Secret the external identity provider signs operator tokens with.
    pub jwt_secret: String,
    pub cors_origins: Vec<String>,
    /// Origins allowed to hit the public tracking endpoints. Empty list
    /// disables the origin check.
    pub tracking_allowed_origins: Vec<String>,
    pub trust_proxy_headers: bool,
    pub trusted_proxy_cidrs: Vec<String>,
    pub event_rate_limit_requests: u32,
    pub event_rate_limit_window_seconds: u64,
    pub public_event_rate_limit_requests: u32,
    pub public_event_rate_limit_window_seconds: u64,
    pub public_request_rate_limit_requests: u32,
    pub public_request_rate_limit_window_seconds: u64,
    /// `keyId:secret` or bare `secret` entries; bare secrets are assigned
    /// position-based ids.
    pub events_write_keys: Vec<String>,
    /// Single-key form kept for deployments that predate rotation.
    pub events_write_key: Option<String>,
    pub events_require_key: bool,
    pub allow_request_reopen: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let jwt_secret = env_or("JWT_SECRET", "");
        if jwt_secret.is_empty() {
            tracing::warn!("JWT_SECRET not set; operator endpoints will reject all tokens");
        }

        Ok(Self {
            bind_addr: env_or("BIND_ADDR", "0.0.0.0:3000"),
            database_url: env_or("DATABASE_URL", "sqlite:vitrina.db?mode=rwc"),
            jwt_secret,
            cors_origins: env_list("CORS_ORIGINS"),
            tracking_allowed_origins: env_list("TRACKING_ALLOWED_ORIGINS"),
            trust_proxy_headers: env_bool("TRUST_PROXY_HEADERS", false)?,
            trusted_proxy_cidrs: env_list("TRUSTED_PROXY_CIDRS"),
            event_rate_limit_requests: env_u32("EVENT_RATE_LIMIT_REQUESTS", 120)?,
            event_rate_limit_window_seconds: env_u64("EVENT_RATE_LIMIT_WINDOW_SECONDS", 60)?,
            public_event_rate_limit_requests: env_u32("PUBLIC_EVENT_RATE_LIMIT_REQUESTS", 300)?,
            public_event_rate_limit_window_seconds: env_u64(
                "PUBLIC_EVENT_RATE_LIMIT_WINDOW_SECONDS",
                60,
            )?,
            public_request_rate_limit_requests: env_u32("PUBLIC_REQUEST_RATE_LIMIT_REQUESTS", 60)?,
            public_request_rate_limit_window_seconds: env_u64(
                "PUBLIC_REQUEST_RATE_LIMIT_WINDOW_SECONDS",
                60,
            )?,
            events_write_keys: env_list("EVENTS_WRITE_KEYS"),
            events_write_key: std::env::var("EVENTS_WRITE_KEY").ok().filter(|v| !v.trim().is_empty()),
            events_require_key: env_bool("EVENTS_REQUIRE_KEY", false)?,
            allow_request_reopen: env_bool("ALLOW_REQUEST_REOPEN", false)?,
        })
    }
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_list(name: &str) -> Vec<String> {
    std::env::var(name)
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect()
}

fn env_bool(name: &str, default: bool) -> Result<bool> {
    match std::env::var(name) {
        Ok(value) => match value.trim() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" | "" => Ok(false),
            other => anyhow::bail!("{name} must be a boolean, got {other:?}"),
        },
        Err(_) => Ok(default),
    }
}

fn env_u32(name: &str, default: u32) -> Result<u32> {
    match std::env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .with_context(|| format!("{name} must be an integer")),
        Err(_) => Ok(default),
    }
}

fn env_u64(name: &str, default: u64) -> Result<u64> {
    match std::env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .with_context(|| format!("{name} must be an integer")),
        Err(_) => Ok(default),
    }
}
