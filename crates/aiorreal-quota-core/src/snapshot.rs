//! Quota snapshot: the read-model composed from subscription and wallet.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::WalletId;
use crate::plan::{BillingCycle, PlanConfig};
use crate::subscription::Subscription;
use crate::wallet::Wallet;

/// A point-in-time view of a user's quota position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaSnapshot {
    /// Resolved plan id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan_id: Option<String>,

    /// Resolved plan family key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan_key: Option<String>,

    /// Billing cycle.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cycle: Option<BillingCycle>,

    /// Whether an active premium entitlement exists.
    pub is_active: bool,

    /// Whether the subscription renews at period end.
    pub will_renew: bool,

    /// Period start (wallet's, falling back to the subscription's).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period_start: Option<DateTime<Utc>>,

    /// Period end (wallet's, falling back to the subscription's).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period_end: Option<DateTime<Utc>>,

    /// Quota granted for the period.
    pub quota_total: u32,

    /// Quota consumed so far.
    pub quota_used: u32,

    /// Quota still available.
    pub quota_remaining: u32,

    /// The active wallet, when one exists.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wallet_id: Option<WalletId>,
}

impl QuotaSnapshot {
    /// Compose a snapshot from the subscription, its active wallet, and the
    /// catalog entry for the subscription's plan.
    ///
    /// The wallet is authoritative for quota figures when present; the plan
    /// supplies the total otherwise.
    #[must_use]
    pub fn compose(
        subscription: &Subscription,
        wallet: Option<&Wallet>,
        plan: Option<&PlanConfig>,
    ) -> Self {
        let quota_total = wallet
            .map(|w| w.quota_total)
            .or(plan.map(|p| p.quota))
            .unwrap_or(0);
        let quota_used = wallet.map(|w| w.quota_used).unwrap_or(0);

        Self {
            plan_id: subscription.plan_id.clone(),
            plan_key: subscription.plan_key.clone(),
            cycle: subscription.cycle,
            is_active: subscription.is_active,
            will_renew: subscription.will_renew,
            period_start: wallet
                .and_then(|w| w.period_start)
                .or(subscription.current_period_start),
            period_end: wallet
                .and_then(|w| w.period_end)
                .or(subscription.current_period_end),
            quota_total,
            quota_used,
            quota_remaining: quota_total.saturating_sub(quota_used),
            wallet_id: wallet.map(|w| w.id.clone()),
        }
    }
}
