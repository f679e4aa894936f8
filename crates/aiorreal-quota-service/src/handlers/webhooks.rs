//! Billing provider webhook handler.

use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;

use aiorreal_quota_core::BillingEvent;

use crate::error::ApiError;
use crate::state::AppState;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the hex HMAC-SHA256 signature of the raw body.
pub const SIGNATURE_HEADER: &str = "x-webhook-signature";

/// The signature the provider is configured to send for a delivery body:
/// hex-encoded HMAC-SHA256 over the raw bytes. Exposed for tests and
/// operational tooling that replays deliveries.
///
/// # Panics
///
/// Never panics in practice: HMAC accepts keys of any size per RFC 2104.
#[must_use]
pub fn billing_signature(secret: &str, body: &str) -> String {
    hex::encode(delivery_mac(secret, body).finalize().into_bytes())
}

fn delivery_mac(secret: &str, body: &str) -> HmacSha256 {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key size");
    mac.update(body.as_bytes());
    mac
}

/// Check a delivery's signature header against the shared secret.
///
/// Signatures that are not valid hex fail outright; the byte comparison
/// runs in constant time inside the MAC verification.
fn verify_delivery(secret: &str, body: &str, signature_hex: &str) -> bool {
    let Ok(signature) = hex::decode(signature_hex.trim()) else {
        return false;
    };
    delivery_mac(secret, body).verify_slice(&signature).is_ok()
}

/// Webhook response.
#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    /// Whether the webhook was accepted.
    pub received: bool,
}

/// Handle a billing event from the subscription provider.
///
/// Duplicate deliveries are accepted and dropped inside the engine, so the
/// provider's at-least-once retries always see success.
pub async fn billing_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<WebhookResponse>, ApiError> {
    if let Some(secret) = &state.config.webhook_secret {
        let signature = headers
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::BadRequest("Missing webhook signature".into()))?;

        if !verify_delivery(secret, &body, signature) {
            tracing::warn!("Invalid webhook signature");
            return Err(ApiError::BadRequest("Invalid webhook signature".into()));
        }
    } else {
        // No secret configured - skip verification (development mode)
        tracing::warn!("Webhook secret not configured - skipping signature verification");
    }

    let mut event: BillingEvent =
        serde_json::from_str(&body).map_err(|e| ApiError::BadRequest(e.to_string()))?;
    if event.user_id.is_empty() {
        return Err(ApiError::BadRequest("Missing user_id".into()));
    }
    // Keep the full delivery for forensics when the payload did not carry
    // its own raw_event copy.
    if event.raw_event.is_null() {
        event.raw_event = serde_json::from_str(&body).unwrap_or(serde_json::Value::Null);
    }

    tracing::info!(
        user_id = %event.user_id,
        event_type = %event.event_type_upper(),
        event_id = ?event.event_id,
        "Received billing event"
    );

    state.core.process_billing_event(&event)?;
    Ok(Json(WebhookResponse { received: true }))
}
