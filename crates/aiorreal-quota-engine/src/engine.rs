//! The `QuotaCore` facade: the four public operation groups consumed by
//! the outer API layer.

use std::sync::Arc;

use chrono::Utc;

use aiorreal_quota_core::{
    BillingEvent, PlanCatalog, QuotaSnapshot, RequestId, UsageStatus, UserId, FREE_PLAN_ID,
};
use aiorreal_quota_store::DocumentStore;

use crate::error::Result;
use crate::ledger::{ReserveOutcome, UsageLedger};
use crate::subscriptions::SubscriptionManager;
use crate::users::UserRecords;
use crate::wallets::WalletManager;
use crate::webhooks::WebhookProcessor;

/// Default plan candidate when the oracle reports premium without naming a
/// product.
const DEFAULT_PREMIUM_CANDIDATE: &str = "premium_monthly";

/// What the premium-status oracle reports about a user.
#[derive(Debug, Clone, Default)]
pub struct PremiumHint {
    /// Whether the user currently holds a premium entitlement.
    pub premium: bool,
    /// The product backing the entitlement, when known.
    pub entitlement_product_id: Option<String>,
}

/// The quota & subscription state engine.
///
/// Carries references to the immutable plan catalog and the store;
/// constructed once at startup and passed explicitly, no hidden globals.
pub struct QuotaCore<S> {
    users: UserRecords<S>,
    subscriptions: SubscriptionManager<S>,
    wallets: WalletManager<S>,
    ledger: UsageLedger<S>,
    webhooks: WebhookProcessor<S>,
    catalog: Arc<PlanCatalog>,
}

impl<S> Clone for QuotaCore<S> {
    fn clone(&self) -> Self {
        Self {
            users: self.users.clone(),
            subscriptions: self.subscriptions.clone(),
            wallets: self.wallets.clone(),
            ledger: self.ledger.clone(),
            webhooks: self.webhooks.clone(),
            catalog: Arc::clone(&self.catalog),
        }
    }
}

impl<S: DocumentStore> QuotaCore<S> {
    /// Compose the engine over a store and plan catalog.
    pub fn new(store: Arc<S>, catalog: PlanCatalog) -> Self {
        let catalog = Arc::new(catalog);
        let users = UserRecords::new(Arc::clone(&store));
        let wallets = WalletManager::new(Arc::clone(&store), Arc::clone(&catalog));
        let subscriptions = SubscriptionManager::new(
            Arc::clone(&store),
            Arc::clone(&catalog),
            wallets.clone(),
        );
        let ledger = UsageLedger::new(
            Arc::clone(&store),
            subscriptions.clone(),
            wallets.clone(),
        );
        let webhooks = WebhookProcessor::new(store, Arc::clone(&catalog), wallets.clone());
        Self {
            users,
            subscriptions,
            wallets,
            ledger,
            webhooks,
            catalog,
        }
    }

    /// The plan catalog the engine was built with.
    #[must_use]
    pub fn catalog(&self) -> &PlanCatalog {
        &self.catalog
    }

    /// Anchor the user in the quota domain and reconcile subscription and
    /// wallet state with what the premium-status oracle reports.
    ///
    /// Users unknown to the quota domain land on the free plan. A positive
    /// report syncs the reported product. A negative report syncs free
    /// only when no active subscription exists: revoking an active paid
    /// plan is the billing events' job, and a transiently wrong oracle
    /// read must not tear down a paid wallet. Returns the resulting
    /// snapshot.
    pub fn ensure_quota(
        &self,
        user_id: &UserId,
        hint: Option<&PremiumHint>,
    ) -> Result<Option<QuotaSnapshot>> {
        if user_id.is_empty() {
            return Ok(None);
        }
        let now = Utc::now();
        self.users.ensure(user_id, None, now)?;

        let existing = self.subscriptions.get(user_id)?;
        let candidate = match hint {
            Some(h) if h.premium => Some(
                h.entitlement_product_id
                    .clone()
                    .unwrap_or_else(|| DEFAULT_PREMIUM_CANDIDATE.to_owned()),
            ),
            Some(_) => match &existing {
                Some(sub) if sub.is_active => {
                    tracing::debug!(
                        user_id = %user_id,
                        plan_id = ?sub.plan_id,
                        "Oracle reports no premium, keeping active subscription"
                    );
                    None
                }
                _ => Some(FREE_PLAN_ID.to_owned()),
            },
            None if existing.is_none() => Some(FREE_PLAN_ID.to_owned()),
            None => None,
        };
        if let Some(candidate) = candidate {
            self.subscriptions.sync_from_plan(user_id, &candidate, now)?;
        }

        // The free tier draws from a wallet too; make sure one exists and
        // the period is current.
        if let Some(subscription) = self.subscriptions.get(user_id)? {
            self.wallets.ensure_active(&subscription, now)?;
        }

        self.get_snapshot(user_id)
    }

    /// A point-in-time view of the user's quota position, or `None` when
    /// the user has no subscription document.
    pub fn get_snapshot(&self, user_id: &UserId) -> Result<Option<QuotaSnapshot>> {
        let Some(subscription) = self.subscriptions.get(user_id)? else {
            return Ok(None);
        };
        let wallet = self.wallets.get_active(user_id)?;
        let plan = subscription
            .plan_id
            .as_deref()
            .and_then(|id| self.catalog.get(id));
        Ok(Some(QuotaSnapshot::compose(
            &subscription,
            wallet.as_ref(),
            plan,
        )))
    }

    /// Reserve quota for a billable action. See [`UsageLedger::reserve`].
    pub fn reserve(
        &self,
        user_id: &UserId,
        request_id: &RequestId,
        action: &str,
        amount: u32,
    ) -> Result<ReserveOutcome> {
        self.ledger
            .reserve(user_id, request_id, action, amount, Utc::now())
    }

    /// Finalize a reservation. See [`UsageLedger::commit`].
    pub fn commit(&self, user_id: &UserId, request_id: &RequestId) -> Result<Option<UsageStatus>> {
        self.ledger.commit(user_id, request_id, Utc::now())
    }

    /// Undo a reservation. See [`UsageLedger::rollback`].
    pub fn rollback(
        &self,
        user_id: &UserId,
        request_id: &RequestId,
    ) -> Result<Option<UsageStatus>> {
        self.ledger.rollback(user_id, request_id, Utc::now())
    }

    /// Process one inbound billing event. See [`WebhookProcessor::process`].
    pub fn process_billing_event(&self, event: &BillingEvent) -> Result<()> {
        self.webhooks.process(event, Utc::now())
    }
}
