//! Router assembly
//!
//! Shared between `main` and the integration tests so both drive the same
//! middleware stack.

use std::sync::Arc;

use axum::http::{header, HeaderName, HeaderValue, Method};
use axum::middleware;
use axum::routing::{get, patch, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::state::AppState;
use crate::{admin_handlers, auth, handlers, metrics};

pub fn build_router(state: Arc<AppState>) -> Router {
    // Public routes (write-key auth happens inside the gateway)
    let public_routes = Router::new()
        .route("/health", get(handlers::health))
        .route("/metrics", get(metrics::metrics_handler))
        .route("/api/track/events", post(handlers::track_event))
        .route("/api/track/requests", post(handlers::track_request));

    // Protected routes (require operator auth)
    let protected_routes = Router::new()
        .route("/api/analytics/events", post(admin_handlers::register_event))
        .route(
            "/api/analytics/ingestion-metrics",
            get(admin_handlers::ingestion_metrics),
        )
        .route("/api/requests/{id}", get(admin_handlers::get_request))
        .route(
            "/api/requests/{id}/status",
            patch(admin_handlers::update_request_status),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::auth_middleware,
        ));

    let cors = build_cors(&state.config);

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        // Security headers
        .layer(SetResponseHeaderLayer::if_not_present(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
}

fn build_cors(config: &Config) -> CorsLayer {
    if config.cors_origins.is_empty() {
        return CorsLayer::permissive();
    }
    CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::OPTIONS])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            header::ACCEPT,
            HeaderName::from_static("x-events-key"),
            HeaderName::from_static("x-request-id"),
        ])
        .allow_origin(
            config
                .cors_origins
                .iter()
                .filter_map(|origin| origin.parse::<HeaderValue>().ok())
                .collect::<Vec<_>>(),
        )
}
