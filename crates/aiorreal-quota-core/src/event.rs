//! Billing events: the inbound webhook payload, its classification, and the
//! dedup record persisted per event.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::ids::UserId;
use crate::subscription::SubscriptionStatus;
use crate::time::{normalize_timestamp, TimestampInput};

/// Prefix for webhook event document ids.
const EVENT_DOC_PREFIX: &str = "rc_";

/// A billing event as delivered by the subscription provider.
///
/// Timestamps may arrive as epoch numbers or ISO strings; they are carried
/// raw and normalized on access. `raw_event` keeps the serialized payload
/// for forensics only and is never interpreted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillingEvent {
    /// The user the event concerns.
    pub user_id: UserId,

    /// Provider event id, when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,

    /// Provider event type (any casing on the wire).
    pub event_type: String,

    /// Provider-side app user id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rc_app_user_id: Option<String>,

    /// Raw product identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_id: Option<String>,

    /// Provider entitlement identifiers.
    #[serde(default)]
    pub entitlement_ids: Vec<String>,

    /// Store platform.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,

    /// Provider-reported renewal flag, when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub will_renew: Option<bool>,

    /// Period start, raw.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period_start: Option<TimestampInput>,

    /// Period end, raw.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period_end: Option<TimestampInput>,

    /// Original purchase date, raw.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_purchase_date: Option<TimestampInput>,

    /// The raw provider payload, kept for forensics.
    #[serde(default)]
    pub raw_event: serde_json::Value,
}

impl BillingEvent {
    /// The uppercased event type used for classification and dedup.
    #[must_use]
    pub fn event_type_upper(&self) -> String {
        self.event_type.trim().to_uppercase()
    }

    /// Normalized period start.
    #[must_use]
    pub fn period_start_utc(&self) -> Option<DateTime<Utc>> {
        self.period_start.as_ref().and_then(normalize_timestamp)
    }

    /// Normalized period end.
    #[must_use]
    pub fn period_end_utc(&self) -> Option<DateTime<Utc>> {
        self.period_end.as_ref().and_then(normalize_timestamp)
    }

    /// Normalized original purchase date.
    #[must_use]
    pub fn original_purchase_date_utc(&self) -> Option<DateTime<Utc>> {
        self.original_purchase_date
            .as_ref()
            .and_then(normalize_timestamp)
    }

    /// Derive the dedup document id for this event.
    ///
    /// Events with a provider id use it directly; otherwise the id is a
    /// deterministic hash of user, type, and normalized period bounds so
    /// redelivery of the same logical event collides.
    #[must_use]
    pub fn doc_id(&self) -> String {
        if let Some(id) = self.event_id.as_deref().filter(|id| !id.trim().is_empty()) {
            return format!("{EVENT_DOC_PREFIX}{}", id.trim());
        }

        let period_start = self
            .period_start_utc()
            .map(|t| t.to_rfc3339())
            .unwrap_or_default();
        let period_end = self
            .period_end_utc()
            .map(|t| t.to_rfc3339())
            .unwrap_or_default();
        let material = format!(
            "{}:{}:{}:{}",
            self.user_id,
            self.event_type_upper(),
            period_start,
            period_end
        );
        let digest = Sha256::digest(material.as_bytes());
        format!("{EVENT_DOC_PREFIX}{}", hex::encode(digest))
    }
}

/// The classified kind of a billing event.
///
/// Derived from the uppercased event-type string; classification is
/// first-match in the order refund, expiration, billing issue,
/// cancellation, purchase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A purchase, renewal, product change, or uncancellation.
    Purchase,
    /// Auto-renew was disabled; access continues until period end.
    Cancellation,
    /// The subscription lapsed.
    Expiration,
    /// A refund or chargeback.
    Refund,
    /// A payment failure, pause, or grace period.
    BillingIssue,
    /// Anything else; the subscription keeps its current status.
    Unknown,
}

impl EventKind {
    /// Classify an uppercased event-type string.
    #[must_use]
    pub fn classify(event_type_upper: &str) -> Self {
        match event_type_upper {
            "REFUND" | "CHARGEBACK" => Self::Refund,
            "EXPIRATION" | "EXPIRE" => Self::Expiration,
            "BILLING_ISSUE" | "PAUSE" | "BILLING_ISSUE_DETECTED" | "GRACE_PERIOD" => {
                Self::BillingIssue
            }
            "CANCELLATION" | "CANCEL" | "AUTO_RENEW_DISABLED" => Self::Cancellation,
            "INITIAL_PURCHASE" | "RENEWAL" | "PRODUCT_CHANGE" | "UNCANCELLATION"
            | "SUBSCRIPTION_PURCHASE" => Self::Purchase,
            _ => Self::Unknown,
        }
    }

    /// The subscription status this kind drives toward.
    ///
    /// `Unknown` keeps the existing status, defaulting to active for brand
    /// new subscriptions.
    #[must_use]
    pub fn target_status(self, existing: Option<SubscriptionStatus>) -> SubscriptionStatus {
        match self {
            Self::Refund => SubscriptionStatus::Refunded,
            Self::Expiration => SubscriptionStatus::Expired,
            Self::BillingIssue => SubscriptionStatus::BillingIssue,
            Self::Cancellation => SubscriptionStatus::Cancelled,
            Self::Purchase => SubscriptionStatus::Active,
            Self::Unknown => existing.unwrap_or(SubscriptionStatus::Active),
        }
    }

    /// Whether this kind represents a purchase-family event.
    #[must_use]
    pub const fn is_purchase(self) -> bool {
        matches!(self, Self::Purchase)
    }
}

/// Processing state of a webhook event record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookStatus {
    /// Recorded; processing may still be in flight.
    Received,
    /// Fully processed, side effects applied.
    Processed,
}

/// The per-event dedup record, id = [`BillingEvent::doc_id`].
///
/// First-write-wins: if the document exists when an event arrives, the
/// event is a duplicate and is dropped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEventRecord {
    /// Provider event id, when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_event_id: Option<String>,

    /// Uppercased event type.
    pub event_type: String,

    /// Provider-side app user id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rc_app_user_id: Option<String>,

    /// When the event arrived.
    pub received_at: DateTime<Utc>,

    /// When processing finished.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<DateTime<Utc>>,

    /// The serialized raw payload, for forensics only.
    pub payload_json: String,

    /// Processing state.
    pub status: WebhookStatus,
}
