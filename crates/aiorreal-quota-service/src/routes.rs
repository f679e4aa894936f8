//! Router configuration.
//!
//! This module sets up the Axum router with all routes and middleware.

use std::sync::Arc;
use std::time::Duration;

use axum::http::HeaderValue;
use axum::routing::{get, post};
use axum::Router;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{health, quota, webhooks};
use crate::state::AppState;

/// Maximum concurrent requests on the reserve/settle path. Reservation
/// traffic is one call per billable action, so this bounds store
/// transaction contention.
const QUOTA_MAX_CONCURRENT_REQUESTS: usize = 100;

/// Create the service router with all routes and middleware.
///
/// # Routes
///
/// ## Public
/// - `GET /health` - Health check
///
/// ## Quota (gateway-authenticated user id)
/// - `POST /v1/quota/ensure` - Reconcile state, return snapshot
/// - `GET /v1/quota/snapshot` - Current snapshot
/// - `POST /v1/quota/reserve` - Reserve quota
/// - `POST /v1/quota/commit` - Finalize a reservation
/// - `POST /v1/quota/rollback` - Undo a reservation
///
/// ## Webhooks (signature verification)
/// - `POST /webhooks/billing` - Billing provider events
pub fn create_router(state: AppState) -> Router {
    let max_body_bytes = state.config.max_body_bytes;
    let request_timeout_seconds = state.config.request_timeout_seconds;

    // A "*" entry means origin policy is enforced upstream; otherwise only
    // the configured origins may call. Unparseable entries are dropped.
    let cors = if state.config.cors_origins.iter().any(|o| o == "*") {
        CorsLayer::permissive()
    } else {
        let allowed: Vec<HeaderValue> = state
            .config
            .cors_origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(allowed)
            .allow_methods(Any)
            .allow_headers(Any)
    };

    let state = Arc::new(state);

    let quota_routes = Router::new()
        .route("/ensure", post(quota::ensure_quota))
        .route("/snapshot", get(quota::get_snapshot))
        .route("/reserve", post(quota::reserve))
        .route("/commit", post(quota::commit))
        .route("/rollback", post(quota::rollback))
        .layer(ConcurrencyLimitLayer::new(QUOTA_MAX_CONCURRENT_REQUESTS));

    Router::new()
        // Health (public)
        .route("/health", get(health::health))
        // Quota API
        .nest("/v1/quota", quota_routes)
        // Webhooks (no concurrency limit - controlled by the provider)
        .route("/webhooks/billing", post(webhooks::billing_webhook))
        // Global middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TimeoutLayer::new(Duration::from_secs(
            request_timeout_seconds,
        )))
        .with_state(state)
}
