//! Subscription document: one per user, projecting provider state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::UserId;
use crate::plan::{BillingCycle, FREE_PLAN_ID};

/// Status of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    /// Subscription is active.
    Active,
    /// Cancelled but usable until the period end (auto-renew off).
    Cancelled,
    /// Period ended without renewal.
    Expired,
    /// Refunded or charged back; access revoked immediately.
    Refunded,
    /// Payment failed or paused; access suspended.
    BillingIssue,
}

impl SubscriptionStatus {
    /// Get the status name as a string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Cancelled => "cancelled",
            Self::Expired => "expired",
            Self::Refunded => "refunded",
            Self::BillingIssue => "billing_issue",
        }
    }

    /// Whether this status keeps the subscription usable.
    ///
    /// Cancelled subscriptions remain usable until period end.
    #[must_use]
    pub const fn is_usable(self) -> bool {
        matches!(self, Self::Active | Self::Cancelled)
    }
}

/// A user's subscription document, id = user id.
///
/// Materialized from plan-sync requests and billing events; `is_active`
/// reports the presence of an active premium entitlement and is `true`
/// exactly when `status` is `active` or `cancelled`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    /// The owning user.
    pub user_id: UserId,

    /// Store platform reported by the provider (e.g. `ios`, `android`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,

    /// Provider-side app user id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rc_app_user_id: Option<String>,

    /// Raw product identifier last reported by the provider.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_id: Option<String>,

    /// Resolved canonical plan id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan_id: Option<String>,

    /// Resolved plan family key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan_key: Option<String>,

    /// Resolved billing cycle.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cycle: Option<BillingCycle>,

    /// Provider entitlement identifiers; carried, never interpreted.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entitlement_ids: Vec<String>,

    /// Whether an active premium entitlement exists.
    pub is_active: bool,

    /// Whether the subscription renews at period end.
    pub will_renew: bool,

    /// Current subscription status.
    pub status: SubscriptionStatus,

    /// Start of the current billing period.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_period_start: Option<DateTime<Utc>>,

    /// End of the current billing period.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_period_end: Option<DateTime<Utc>>,

    /// When the last billing event touched this document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_event_at: Option<DateTime<Utc>>,

    /// Original purchase date reported by the provider.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_purchase_date: Option<DateTime<Utc>>,

    /// When the document was created.
    pub created_at: DateTime<Utc>,

    /// When the document was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Subscription {
    /// Whether the subscription is on the free plan.
    #[must_use]
    pub fn is_free_plan(&self) -> bool {
        self.plan_id.as_deref() == Some(FREE_PLAN_ID)
    }

    /// Whether the user may draw metered quota right now.
    ///
    /// Premium access requires `is_active`; the free tier keeps its metered
    /// allowance even though it carries no active premium entitlement.
    #[must_use]
    pub fn has_quota_access(&self) -> bool {
        self.is_active || self.is_free_plan()
    }

    /// Whether the subscription carries a billing period.
    #[must_use]
    pub fn has_period(&self) -> bool {
        self.current_period_start.is_some() && self.current_period_end.is_some()
    }
}
