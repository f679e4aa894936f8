//! Wallet manager: opens, closes, and period-rolls quota wallets.
//!
//! Enforces the one-active-wallet-per-user invariant. The "active wallet"
//! is the single `status = active` document for a user, most recent by
//! `period_end`; when indexing surfaces more than one (a violated
//! invariant), the most recent wins and the rest are closed on the next
//! write path through here.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::json;

use aiorreal_quota_core::{
    CloseReason, PlanCatalog, Subscription, UserId, Wallet, WalletId, WalletStatus,
};
use aiorreal_quota_store::{Collection, Document, DocumentStore, Filter, WriteOp};

use crate::codec::{decode, encode};
use crate::error::Result;

/// Manages the `quota_wallets` collection.
pub struct WalletManager<S> {
    store: Arc<S>,
    catalog: Arc<PlanCatalog>,
}

impl<S> Clone for WalletManager<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            catalog: Arc::clone(&self.catalog),
        }
    }
}

impl<S: DocumentStore> WalletManager<S> {
    /// Create a wallet manager.
    pub fn new(store: Arc<S>, catalog: Arc<PlanCatalog>) -> Self {
        Self { store, catalog }
    }

    fn active_filter(user_id: &UserId) -> Filter {
        Filter::new()
            .eq("user_id", user_id.as_str())
            .eq("status", WalletStatus::Active.as_str())
            .order_by_desc("period_end")
    }

    fn active_rows(&self, user_id: &UserId) -> Result<Vec<(String, Document)>> {
        Ok(self
            .store
            .query(Collection::Wallets, &Self::active_filter(user_id))?)
    }

    /// The user's active wallet, if any.
    pub fn get_active(&self, user_id: &UserId) -> Result<Option<Wallet>> {
        let rows = self.active_rows(user_id)?;
        rows.first()
            .map(|(_, doc)| decode(doc))
            .transpose()
            .map_err(Into::into)
    }

    /// Return a wallet valid for the subscription's current period, rolling
    /// the period over when the existing wallet has lapsed.
    ///
    /// Returns `None` when the subscription grants no quota access. When the
    /// subscription lacks a period, the existing wallet (possibly stale) is
    /// returned unchanged and a warning logged; callers tolerate it.
    pub fn ensure_active(
        &self,
        subscription: &Subscription,
        now: DateTime<Utc>,
    ) -> Result<Option<Wallet>> {
        if !subscription.has_quota_access() {
            return Ok(None);
        }
        let user_id = &subscription.user_id;

        let rows = self.active_rows(user_id)?;
        if rows.len() > 1 {
            tracing::warn!(
                user_id = %user_id,
                active_count = rows.len(),
                "Multiple active wallets, closing stale duplicates"
            );
            self.close_rows(&rows[1..], CloseReason::PeriodReset, false, now)?;
        }
        let existing: Option<Wallet> = rows.first().map(|(_, doc)| decode(doc)).transpose()?;

        if let Some(wallet) = &existing {
            if wallet
                .effective_end(subscription.current_period_end)
                .is_some_and(|end| end > now)
            {
                return Ok(existing);
            }
        }

        if !subscription.has_period() {
            tracing::warn!(
                user_id = %user_id,
                "Subscription has no period, keeping existing wallet unchanged"
            );
            return Ok(existing);
        }

        // Resolve the plan before closing anything so a catalog miss never
        // leaves the user walletless.
        let plan_id = subscription.plan_id.as_deref().unwrap_or_default();
        if self.catalog.get(plan_id).is_none() {
            tracing::warn!(
                user_id = %user_id,
                plan_id = %plan_id,
                "Plan unresolvable on period roll, keeping existing wallet"
            );
            return Ok(existing);
        }

        self.close_all_active(user_id, CloseReason::PeriodReset, false, now)?;
        self.open(subscription, false, now)
    }

    /// Open a new wallet from the subscription's resolved plan.
    ///
    /// Requires a resolvable plan; logs and returns `None` otherwise. When
    /// `close_existing`, active wallets are first closed with reason
    /// `plan_change`, remaining quota kept as history.
    pub fn open(
        &self,
        subscription: &Subscription,
        close_existing: bool,
        now: DateTime<Utc>,
    ) -> Result<Option<Wallet>> {
        let user_id = &subscription.user_id;
        let plan_id = subscription.plan_id.as_deref().unwrap_or_default();
        let Some(plan) = self.catalog.get(plan_id) else {
            tracing::warn!(
                user_id = %user_id,
                plan_id = %plan_id,
                "Cannot open wallet for unresolvable plan"
            );
            return Ok(None);
        };

        if close_existing {
            self.close_all_active(user_id, CloseReason::PlanChange, false, now)?;
        }

        let id = WalletId::from(self.store.allocate_id());
        let wallet = Wallet {
            id: id.clone(),
            user_id: user_id.clone(),
            subscription_id: Some(user_id.as_str().to_owned()),
            plan_id: Some(plan.plan_id.clone()),
            scope: plan.cycle,
            period_start: subscription.current_period_start,
            period_end: subscription.current_period_end,
            quota_total: plan.quota,
            quota_used: 0,
            status: WalletStatus::Active,
            last_usage_at: None,
            closed_reason: None,
            created_at: now,
            updated_at: now,
        };
        self.store
            .set(Collection::Wallets, id.as_str(), &encode(&wallet)?, false)?;

        tracing::info!(
            user_id = %user_id,
            wallet_id = %id,
            plan_id = %plan.plan_id,
            quota_total = wallet.quota_total,
            "Wallet opened"
        );
        Ok(Some(wallet))
    }

    /// Close every active wallet for the user.
    ///
    /// With `set_remaining_to_zero`, remaining quota is forcibly exhausted
    /// (`quota_used = quota_total`): refunds and expirations forfeit the
    /// allowance. Without it, the closed wallet's remaining is historical.
    pub fn close_all_active(
        &self,
        user_id: &UserId,
        reason: CloseReason,
        set_remaining_to_zero: bool,
        now: DateTime<Utc>,
    ) -> Result<usize> {
        let rows = self.active_rows(user_id)?;
        if rows.is_empty() {
            return Ok(0);
        }
        self.close_rows(&rows, reason, set_remaining_to_zero, now)?;
        tracing::info!(
            user_id = %user_id,
            closed = rows.len(),
            reason = reason.as_str(),
            "Closed active wallets"
        );
        Ok(rows.len())
    }

    fn close_rows(
        &self,
        rows: &[(String, Document)],
        reason: CloseReason,
        set_remaining_to_zero: bool,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut writes = Vec::with_capacity(rows.len());
        for (id, doc) in rows {
            let mut patch = json!({
                "status": WalletStatus::Closed,
                "closed_reason": reason,
                "updated_at": now,
            });
            if set_remaining_to_zero {
                let total = doc.get("quota_total").cloned().unwrap_or(json!(0));
                patch["quota_used"] = total;
            }
            writes.push(WriteOp::merge(Collection::Wallets, id.clone(), patch));
        }
        self.store.batch(writes)?;
        Ok(())
    }
}
