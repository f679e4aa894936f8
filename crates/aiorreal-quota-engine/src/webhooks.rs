//! Webhook processor: deduplicates billing events and drives subscription
//! and wallet transitions.
//!
//! Processing splits into two transactions. Dedup is first-write-wins on
//! the `webhook_events` collection, making at-least-once delivery safe.
//! The subscription transition is atomic on its own document; wallet
//! close/open touches an unbounded set of documents and runs after it, so
//! the composite is eventually consistent. The reserve path re-validates
//! the wallet in-transaction, which makes that window harmless.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::json;

use aiorreal_quota_core::{
    BillingEvent, CloseReason, EventKind, PlanCatalog, Subscription, SubscriptionStatus,
    WebhookEventRecord, WebhookStatus,
};
use aiorreal_quota_store::{Collection, DocRef, DocumentStore, WriteOp};

use crate::codec::{decode, encode};
use crate::error::Result;
use crate::wallets::WalletManager;

/// What the subscription transition decided; wallet side effects are
/// applied after the transaction commits.
struct Transition {
    subscription: Subscription,
    status: SubscriptionStatus,
    plan_changed: bool,
    period_changed: bool,
    should_open_wallet: bool,
    should_close_wallet: bool,
}

/// Processes billing events against the `webhook_events`,
/// `subscriptions_quota`, and `quota_wallets` collections.
pub struct WebhookProcessor<S> {
    store: Arc<S>,
    catalog: Arc<PlanCatalog>,
    wallets: WalletManager<S>,
}

impl<S> Clone for WebhookProcessor<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            catalog: Arc::clone(&self.catalog),
            wallets: self.wallets.clone(),
        }
    }
}

impl<S: DocumentStore> WebhookProcessor<S> {
    /// Create a webhook processor.
    pub fn new(store: Arc<S>, catalog: Arc<PlanCatalog>, wallets: WalletManager<S>) -> Self {
        Self {
            store,
            catalog,
            wallets,
        }
    }

    /// Process one billing event end to end.
    ///
    /// Duplicates (same derived event id) are dropped after the dedup
    /// check; replays therefore re-run wallet side effects only once.
    /// Malformed payload fields have already collapsed to absent, so
    /// processing is best-effort and the event is still marked processed.
    pub fn process(&self, event: &BillingEvent, now: DateTime<Utc>) -> Result<()> {
        let event_type = event.event_type_upper();
        let event_doc_id = event.doc_id();

        if self.record_event(event, &event_type, &event_doc_id, now)? {
            tracing::info!(
                user_id = %event.user_id,
                event_type = %event_type,
                event_doc_id = %event_doc_id,
                "Duplicate billing event dropped"
            );
            return Ok(());
        }

        let transition = self.apply_transition(event, &event_type, now)?;

        if transition.should_close_wallet {
            // Refund / expiration / billing issue forfeits the remaining
            // allowance immediately.
            let reason =
                CloseReason::from_status(transition.status).unwrap_or(CloseReason::Expired);
            self.wallets
                .close_all_active(&event.user_id, reason, true, now)?;
        }
        if transition.should_open_wallet {
            self.wallets.open(
                &transition.subscription,
                transition.plan_changed || transition.period_changed,
                now,
            )?;
        }

        self.store.set(
            Collection::WebhookEvents,
            &event_doc_id,
            &json!({ "processed_at": now, "status": WebhookStatus::Processed }),
            true,
        )?;

        tracing::info!(
            user_id = %event.user_id,
            event_type = %event_type,
            status = transition.status.as_str(),
            opened_wallet = transition.should_open_wallet,
            closed_wallet = transition.should_close_wallet,
            "Billing event processed"
        );
        Ok(())
    }

    /// First-write-wins dedup. Returns `true` when the event is a
    /// duplicate.
    fn record_event(
        &self,
        event: &BillingEvent,
        event_type: &str,
        event_doc_id: &str,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let mut duplicate = false;
        self.store.transaction(
            &[DocRef::new(Collection::WebhookEvents, event_doc_id)],
            &mut |snap| {
                if snap.get(Collection::WebhookEvents, event_doc_id).is_some() {
                    duplicate = true;
                    return Ok(Vec::new());
                }
                duplicate = false;
                let record = WebhookEventRecord {
                    provider_event_id: event.event_id.clone(),
                    event_type: event_type.to_owned(),
                    rc_app_user_id: event.rc_app_user_id.clone(),
                    received_at: now,
                    processed_at: None,
                    payload_json: event.raw_event.to_string(),
                    status: WebhookStatus::Received,
                };
                Ok(vec![WriteOp::set(
                    Collection::WebhookEvents,
                    event_doc_id,
                    encode(&record)?,
                )])
            },
        )?;
        Ok(duplicate)
    }

    /// Atomically project the event onto the subscription document and
    /// decide wallet side effects.
    fn apply_transition(
        &self,
        event: &BillingEvent,
        event_type: &str,
        now: DateTime<Utc>,
    ) -> Result<Transition> {
        let user_id = &event.user_id;
        let sub_id = user_id.as_str().to_owned();

        let mut transition: Option<Transition> = None;
        self.store.transaction(
            &[DocRef::new(Collection::Subscriptions, sub_id.clone())],
            &mut |snap| {
                let existing: Option<Subscription> = snap
                    .get(Collection::Subscriptions, &sub_id)
                    .map(decode)
                    .transpose()?;

                let resolved = event
                    .product_id
                    .as_deref()
                    .and_then(|p| self.catalog.resolve(p));
                if event.product_id.is_some() && resolved.is_none() {
                    tracing::debug!(
                        user_id = %user_id,
                        product_id = ?event.product_id,
                        "Product unresolvable, keeping existing plan"
                    );
                }

                let plan_id = resolved
                    .map(|p| p.plan_id.clone())
                    .or_else(|| existing.as_ref().and_then(|e| e.plan_id.clone()));
                let plan_key = resolved
                    .map(|p| p.plan_key.clone())
                    .or_else(|| existing.as_ref().and_then(|e| e.plan_key.clone()));
                let cycle = resolved
                    .map(|p| p.cycle)
                    .or_else(|| existing.as_ref().and_then(|e| e.cycle));

                let kind = EventKind::classify(event_type);
                let status = kind.target_status(existing.as_ref().map(|e| e.status));
                let is_active = status.is_usable();
                let will_renew = event
                    .will_renew
                    .unwrap_or(status == SubscriptionStatus::Active);

                let plan_changed =
                    plan_id != existing.as_ref().and_then(|e| e.plan_id.clone());
                let new_period_end = event.period_end_utc();
                let period_changed = new_period_end.is_some()
                    && new_period_end != existing.as_ref().and_then(|e| e.current_period_end);

                let should_open_wallet =
                    is_active && (kind.is_purchase() || plan_changed || period_changed);
                let should_close_wallet = existing.as_ref().is_some_and(|e| e.is_active)
                    && matches!(
                        status,
                        SubscriptionStatus::Expired
                            | SubscriptionStatus::Refunded
                            | SubscriptionStatus::BillingIssue
                    );

                let subscription = Subscription {
                    user_id: user_id.clone(),
                    platform: event
                        .platform
                        .clone()
                        .or_else(|| existing.as_ref().and_then(|e| e.platform.clone())),
                    rc_app_user_id: event
                        .rc_app_user_id
                        .clone()
                        .or_else(|| existing.as_ref().and_then(|e| e.rc_app_user_id.clone())),
                    product_id: event
                        .product_id
                        .clone()
                        .or_else(|| existing.as_ref().and_then(|e| e.product_id.clone())),
                    plan_id,
                    plan_key,
                    cycle,
                    entitlement_ids: if event.entitlement_ids.is_empty() {
                        existing
                            .as_ref()
                            .map(|e| e.entitlement_ids.clone())
                            .unwrap_or_default()
                    } else {
                        event.entitlement_ids.clone()
                    },
                    is_active,
                    will_renew,
                    status,
                    current_period_start: event
                        .period_start_utc()
                        .or_else(|| existing.as_ref().and_then(|e| e.current_period_start)),
                    current_period_end: new_period_end
                        .or_else(|| existing.as_ref().and_then(|e| e.current_period_end)),
                    last_event_at: Some(now),
                    original_purchase_date: event
                        .original_purchase_date_utc()
                        .or_else(|| existing.as_ref().and_then(|e| e.original_purchase_date)),
                    created_at: existing.as_ref().map_or(now, |e| e.created_at),
                    updated_at: now,
                };

                let writes = vec![WriteOp::set(
                    Collection::Subscriptions,
                    sub_id.clone(),
                    encode(&subscription)?,
                )];
                transition = Some(Transition {
                    subscription,
                    status,
                    plan_changed,
                    period_changed,
                    should_open_wallet,
                    should_close_wallet,
                });
                Ok(writes)
            },
        )?;

        // The body runs at least once before the driver can return Ok.
        Ok(transition.expect("transaction body ran"))
    }
}
