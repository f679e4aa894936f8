//! Quota operation handlers: ensure, snapshot, reserve, commit, rollback.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use aiorreal_quota_core::{QuotaSnapshot, RequestId, UsageStatus};
use aiorreal_quota_engine::{PremiumHint, ReserveOutcome};

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::state::AppState;

/// Ensure-quota request: what the premium-status oracle reports, if the
/// gateway consulted it.
#[derive(Debug, Default, Deserialize)]
pub struct EnsureQuotaRequest {
    /// Whether the user holds a premium entitlement.
    #[serde(default)]
    pub premium: Option<bool>,

    /// The product backing the entitlement.
    #[serde(default)]
    pub entitlement_product_id: Option<String>,
}

/// Reconcile subscription and wallet state, returning the snapshot.
pub async fn ensure_quota(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    body: Option<Json<EnsureQuotaRequest>>,
) -> Result<Json<QuotaSnapshot>, ApiError> {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let hint = body.premium.map(|premium| PremiumHint {
        premium,
        entitlement_product_id: body.entitlement_product_id.clone(),
    });

    let snapshot = state.core.ensure_quota(&auth.user_id, hint.as_ref())?;
    snapshot
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("no quota state for user".into()))
}

/// Get the user's current quota snapshot.
pub async fn get_snapshot(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<QuotaSnapshot>, ApiError> {
    state
        .core
        .get_snapshot(&auth.user_id)?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("no quota state for user".into()))
}

/// Reserve request.
#[derive(Debug, Deserialize)]
pub struct ReserveRequest {
    /// Client-supplied idempotency key.
    pub request_id: String,

    /// Billable action name.
    #[serde(default = "default_action")]
    pub action: String,

    /// Units to reserve.
    #[serde(default = "default_amount")]
    pub amount: u32,
}

fn default_action() -> String {
    "ai_detect".to_owned()
}

const fn default_amount() -> u32 {
    1
}

/// Reserve quota for a billable action.
pub async fn reserve(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(body): Json<ReserveRequest>,
) -> Result<Json<ReserveOutcome>, ApiError> {
    let outcome = state.core.reserve(
        &auth.user_id,
        &RequestId::from(body.request_id),
        &body.action,
        body.amount,
    )?;
    Ok(Json(outcome))
}

/// Commit/rollback request.
#[derive(Debug, Deserialize)]
pub struct SettleRequest {
    /// The reservation's idempotency key.
    pub request_id: String,
}

/// Settlement response.
#[derive(Debug, Serialize)]
pub struct SettleResponse {
    /// Terminal status of the reservation.
    pub status: UsageStatus,
}

/// Finalize a reservation.
pub async fn commit(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(body): Json<SettleRequest>,
) -> Result<Json<SettleResponse>, ApiError> {
    state
        .core
        .commit(&auth.user_id, &RequestId::from(body.request_id))?
        .map(|status| Json(SettleResponse { status }))
        .ok_or_else(|| ApiError::NotFound("no such reservation".into()))
}

/// Undo a reservation.
pub async fn rollback(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(body): Json<SettleRequest>,
) -> Result<Json<SettleResponse>, ApiError> {
    state
        .core
        .rollback(&auth.user_id, &RequestId::from(body.request_id))?
        .map(|status| Json(SettleResponse { status }))
        .ok_or_else(|| ApiError::NotFound("no such reservation".into()))
}
