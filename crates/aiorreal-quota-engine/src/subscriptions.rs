//! Subscription manager: projects plan-sync calls into the subscription
//! document.
//!
//! The event-driven projection lives in the webhook processor; this manager
//! handles reads and the synthetic-period plan-sync path driven by the
//! premium-status oracle.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use aiorreal_quota_core::{
    synthetic_period, PlanCatalog, Subscription, SubscriptionStatus, UserId,
};
use aiorreal_quota_store::{Collection, DocumentStore};

use crate::codec::{decode, encode};
use crate::error::Result;
use crate::wallets::WalletManager;

/// Manages the `subscriptions_quota` collection.
pub struct SubscriptionManager<S> {
    store: Arc<S>,
    catalog: Arc<PlanCatalog>,
    wallets: WalletManager<S>,
}

impl<S> Clone for SubscriptionManager<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            catalog: Arc::clone(&self.catalog),
            wallets: self.wallets.clone(),
        }
    }
}

impl<S: DocumentStore> SubscriptionManager<S> {
    /// Create a subscription manager.
    pub fn new(store: Arc<S>, catalog: Arc<PlanCatalog>, wallets: WalletManager<S>) -> Self {
        Self {
            store,
            catalog,
            wallets,
        }
    }

    /// The user's subscription document, if any.
    pub fn get(&self, user_id: &UserId) -> Result<Option<Subscription>> {
        self.store
            .get(Collection::Subscriptions, user_id.as_str())?
            .map(|doc| decode(&doc))
            .transpose()
            .map_err(Into::into)
    }

    /// Materialize subscription state from a plan candidate reported by the
    /// premium-status oracle.
    ///
    /// Resolves the candidate against the catalog (unresolvable candidates
    /// log and no-op), writes the subscription with a synthetic period, and
    /// delegates wallet opening to the wallet manager for non-free plans.
    pub fn sync_from_plan(
        &self,
        user_id: &UserId,
        candidate: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Subscription>> {
        let Some(plan) = self.catalog.resolve(candidate) else {
            tracing::warn!(
                user_id = %user_id,
                candidate = %candidate,
                "Plan candidate unresolvable, skipping sync"
            );
            return Ok(None);
        };

        let (period_start, period_end) = synthetic_period(now, plan.cycle);
        let is_active = !plan.is_free();
        let status = if is_active {
            SubscriptionStatus::Active
        } else {
            SubscriptionStatus::Expired
        };

        let existing = self.get(user_id)?;
        let subscription = Subscription {
            user_id: user_id.clone(),
            platform: existing.as_ref().and_then(|e| e.platform.clone()),
            rc_app_user_id: existing.as_ref().and_then(|e| e.rc_app_user_id.clone()),
            product_id: existing.as_ref().and_then(|e| e.product_id.clone()),
            plan_id: Some(plan.plan_id.clone()),
            plan_key: Some(plan.plan_key.clone()),
            cycle: Some(plan.cycle),
            entitlement_ids: existing
                .as_ref()
                .map(|e| e.entitlement_ids.clone())
                .unwrap_or_default(),
            is_active,
            will_renew: is_active,
            status,
            current_period_start: Some(period_start),
            current_period_end: Some(period_end),
            last_event_at: existing.as_ref().and_then(|e| e.last_event_at),
            original_purchase_date: existing.as_ref().and_then(|e| e.original_purchase_date),
            created_at: existing.as_ref().map_or(now, |e| e.created_at),
            updated_at: now,
        };
        self.store.set(
            Collection::Subscriptions,
            user_id.as_str(),
            &encode(&subscription)?,
            true,
        )?;

        tracing::info!(
            user_id = %user_id,
            plan_id = %plan.plan_id,
            is_active,
            "Subscription synced from plan"
        );

        if is_active {
            self.wallets.ensure_active(&subscription, now)?;
        }
        Ok(Some(subscription))
    }
}
