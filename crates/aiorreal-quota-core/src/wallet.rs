//! Wallet document: a time-bounded quota budget backing one subscription
//! period.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{UserId, WalletId};
use crate::plan::BillingCycle;
use crate::subscription::SubscriptionStatus;

/// Status of a wallet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WalletStatus {
    /// The wallet new reservations are drawn from. At most one per user.
    Active,
    /// Closed; immutable except for audit fields.
    Closed,
}

impl WalletStatus {
    /// Get the status name as a string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Closed => "closed",
        }
    }
}

/// Why a wallet was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    /// The billing period rolled over; remaining quota is historical.
    PeriodReset,
    /// The plan changed; the new wallet resets the budget.
    PlanChange,
    /// The subscription expired; remaining quota is forfeited.
    Expired,
    /// The purchase was refunded; remaining quota is forfeited.
    Refunded,
    /// A billing issue suspended access; remaining quota is forfeited.
    BillingIssue,
}

impl CloseReason {
    /// Get the reason name as a string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PeriodReset => "period_reset",
            Self::PlanChange => "plan_change",
            Self::Expired => "expired",
            Self::Refunded => "refunded",
            Self::BillingIssue => "billing_issue",
        }
    }

    /// The close reason implied by a terminal subscription status, if any.
    #[must_use]
    pub const fn from_status(status: SubscriptionStatus) -> Option<Self> {
        match status {
            SubscriptionStatus::Expired => Some(Self::Expired),
            SubscriptionStatus::Refunded => Some(Self::Refunded),
            SubscriptionStatus::BillingIssue => Some(Self::BillingIssue),
            SubscriptionStatus::Active | SubscriptionStatus::Cancelled => None,
        }
    }
}

/// A quota wallet, id assigned by the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wallet {
    /// Wallet identifier.
    pub id: WalletId,

    /// The owning user.
    pub user_id: UserId,

    /// The subscription document backing this wallet.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription_id: Option<String>,

    /// Plan the wallet was opened from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan_id: Option<String>,

    /// Period granularity, copied from the plan cycle at open time.
    pub scope: BillingCycle,

    /// Start of the backing period.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period_start: Option<DateTime<Utc>>,

    /// End of the backing period.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period_end: Option<DateTime<Utc>>,

    /// Quota granted for the period, copied from the plan at open time.
    pub quota_total: u32,

    /// Quota consumed so far. Monotonically non-decreasing during the wallet
    /// life except via rollback; never exceeds `quota_total`.
    pub quota_used: u32,

    /// Wallet status.
    pub status: WalletStatus,

    /// When the last reservation debited this wallet.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_usage_at: Option<DateTime<Utc>>,

    /// Why the wallet was closed, set on close.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_reason: Option<CloseReason>,

    /// When the document was created.
    pub created_at: DateTime<Utc>,

    /// When the document was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    /// Remaining quota in the wallet.
    #[must_use]
    pub const fn remaining(&self) -> u32 {
        self.quota_total.saturating_sub(self.quota_used)
    }

    /// Whether the wallet is open for reservations.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == WalletStatus::Active
    }

    /// The instant this wallet stops being valid, preferring its own period
    /// end over the subscription's.
    #[must_use]
    pub fn effective_end(&self, subscription_end: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
        self.period_end.or(subscription_end)
    }
}
