//! Usage ledger: the two-phase reserve/commit/rollback protocol.
//!
//! Reservations are keyed by `{user_id}_{request_id}`, so a retried
//! reserve observes the existing record inside the transaction and returns
//! the same outcome without touching the wallet. Commit finalizes the
//! debit already taken at reserve time; rollback refunds it. Commit wins
//! over rollback: once work was acknowledged, undoing the debit would
//! leak quota.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use aiorreal_quota_core::{
    usage_doc_id, RequestId, UsageRecord, UsageStatus, UserId, Wallet, WalletId,
};
use aiorreal_quota_store::{Collection, DocRef, DocumentStore, WriteOp};

use crate::codec::{decode, encode};
use crate::error::Result;
use crate::subscriptions::SubscriptionManager;
use crate::wallets::WalletManager;

/// Outcome status of a reserve call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReserveStatus {
    /// A reservation was taken (or replayed while still pending).
    Reserved,
    /// Replay of an already-committed reservation.
    Committed,
    /// Replay of a rolled-back reservation.
    RolledBack,
    /// The request was not allowed: bad input, no access, exhausted quota,
    /// or no wallet.
    Rejected,
}

impl From<UsageStatus> for ReserveStatus {
    fn from(status: UsageStatus) -> Self {
        match status {
            UsageStatus::Reserved => Self::Reserved,
            UsageStatus::Committed => Self::Committed,
            UsageStatus::RolledBack => Self::RolledBack,
        }
    }
}

/// The discriminated result of a reserve call. Every failure is a value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReserveOutcome {
    /// Whether the caller may run the billable action.
    pub allowed: bool,
    /// Outcome status.
    pub status: ReserveStatus,
    /// Remaining quota in the wallet after this call.
    pub remaining: u32,
    /// The wallet involved, when one was found.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wallet_id: Option<WalletId>,
}

impl ReserveOutcome {
    fn rejected(remaining: u32, wallet_id: Option<WalletId>) -> Self {
        Self {
            allowed: false,
            status: ReserveStatus::Rejected,
            remaining,
            wallet_id,
        }
    }
}

/// Implements metered consumption over the `quota_usages` collection.
pub struct UsageLedger<S> {
    store: Arc<S>,
    subscriptions: SubscriptionManager<S>,
    wallets: WalletManager<S>,
}

impl<S> Clone for UsageLedger<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            subscriptions: self.subscriptions.clone(),
            wallets: self.wallets.clone(),
        }
    }
}

impl<S: DocumentStore> UsageLedger<S> {
    /// Create a usage ledger.
    pub fn new(
        store: Arc<S>,
        subscriptions: SubscriptionManager<S>,
        wallets: WalletManager<S>,
    ) -> Self {
        Self {
            store,
            subscriptions,
            wallets,
        }
    }

    /// Reserve `amount` units against the user's active wallet.
    ///
    /// Idempotent per `(user_id, request_id)`: a replay returns the
    /// existing record's outcome and leaves the wallet untouched. Quota
    /// exhaustion and missing subscriptions/wallets are rejections, not
    /// errors.
    pub fn reserve(
        &self,
        user_id: &UserId,
        request_id: &RequestId,
        action: &str,
        amount: u32,
        now: DateTime<Utc>,
    ) -> Result<ReserveOutcome> {
        if request_id.is_empty() {
            tracing::warn!(user_id = %user_id, "Reserve with empty request id rejected");
            return Ok(ReserveOutcome::rejected(0, None));
        }
        if amount == 0 {
            tracing::warn!(user_id = %user_id, request_id = %request_id, "Reserve with zero amount rejected");
            return Ok(ReserveOutcome::rejected(0, None));
        }

        let Some(subscription) = self.subscriptions.get(user_id)? else {
            return Ok(ReserveOutcome::rejected(0, None));
        };
        if !subscription.has_quota_access() {
            return Ok(ReserveOutcome::rejected(0, None));
        }

        let Some(wallet) = self.wallets.ensure_active(&subscription, now)? else {
            return Ok(ReserveOutcome::rejected(0, None));
        };
        let wallet_id = wallet.id.clone();

        let usage_id = usage_doc_id(user_id, request_id);
        let wallet_ref = DocRef::new(Collection::Wallets, wallet_id.as_str());
        let usage_ref = DocRef::new(Collection::Usages, usage_id.clone());

        let mut outcome: Option<ReserveOutcome> = None;
        self.store
            .transaction(&[wallet_ref, usage_ref], &mut |snap| {
                let Some(wallet_doc) = snap.get(Collection::Wallets, wallet_id.as_str()) else {
                    outcome = Some(ReserveOutcome::rejected(0, None));
                    return Ok(Vec::new());
                };
                let wallet: Wallet = decode(wallet_doc)?;

                if !wallet.is_active() {
                    outcome = Some(ReserveOutcome::rejected(
                        wallet.remaining(),
                        Some(wallet.id.clone()),
                    ));
                    return Ok(Vec::new());
                }

                // Idempotent replay: the record already exists, report its
                // outcome and leave the wallet alone.
                if let Some(usage_doc) = snap.get(Collection::Usages, &usage_id) {
                    let usage: UsageRecord = decode(usage_doc)?;
                    outcome = Some(ReserveOutcome {
                        allowed: usage.status != UsageStatus::RolledBack,
                        status: usage.status.into(),
                        remaining: wallet.remaining(),
                        wallet_id: Some(usage.wallet_id),
                    });
                    return Ok(Vec::new());
                }

                if u64::from(wallet.quota_used) + u64::from(amount)
                    > u64::from(wallet.quota_total)
                {
                    outcome = Some(ReserveOutcome::rejected(
                        wallet.remaining(),
                        Some(wallet.id.clone()),
                    ));
                    return Ok(Vec::new());
                }

                let new_used = wallet.quota_used + amount;
                let usage = UsageRecord {
                    user_id: user_id.clone(),
                    wallet_id: wallet.id.clone(),
                    request_id: request_id.clone(),
                    action: action.to_owned(),
                    amount,
                    status: UsageStatus::Reserved,
                    created_at: now,
                    updated_at: now,
                };
                outcome = Some(ReserveOutcome {
                    allowed: true,
                    status: ReserveStatus::Reserved,
                    remaining: wallet.quota_total.saturating_sub(new_used),
                    wallet_id: Some(wallet.id.clone()),
                });
                Ok(vec![
                    WriteOp::merge(
                        Collection::Wallets,
                        wallet.id.as_str(),
                        json!({
                            "quota_used": new_used,
                            "last_usage_at": now,
                            "updated_at": now,
                        }),
                    ),
                    WriteOp::set(Collection::Usages, usage_id.clone(), encode(&usage)?),
                ])
            })?;

        // The body runs at least once before the driver can return Ok.
        Ok(outcome.expect("transaction body ran"))
    }

    /// Finalize a reservation. Returns the terminal status, `None` when no
    /// such reservation exists. Idempotent: terminal records are returned
    /// unchanged.
    pub fn commit(
        &self,
        user_id: &UserId,
        request_id: &RequestId,
        now: DateTime<Utc>,
    ) -> Result<Option<UsageStatus>> {
        let usage_id = usage_doc_id(user_id, request_id);
        let usage_ref = DocRef::new(Collection::Usages, usage_id.clone());

        let mut result: Option<UsageStatus> = None;
        self.store.transaction(&[usage_ref], &mut |snap| {
            let Some(usage_doc) = snap.get(Collection::Usages, &usage_id) else {
                result = None;
                return Ok(Vec::new());
            };
            let usage: UsageRecord = decode(usage_doc)?;
            if usage.status.is_terminal() {
                result = Some(usage.status);
                return Ok(Vec::new());
            }
            result = Some(UsageStatus::Committed);
            Ok(vec![WriteOp::merge(
                Collection::Usages,
                usage_id.clone(),
                json!({ "status": UsageStatus::Committed, "updated_at": now }),
            )])
        })?;
        Ok(result)
    }

    /// Undo a reservation, refunding the debit to the wallet. Returns the
    /// terminal status, `None` when no such reservation exists.
    ///
    /// Rollback after commit is a no-op returning `committed`.
    pub fn rollback(
        &self,
        user_id: &UserId,
        request_id: &RequestId,
        now: DateTime<Utc>,
    ) -> Result<Option<UsageStatus>> {
        let usage_id = usage_doc_id(user_id, request_id);

        // Learn the wallet id outside the transaction; it is immutable on
        // the usage record, so the read-set below stays consistent.
        let Some(existing) = self.store.get(Collection::Usages, &usage_id)? else {
            return Ok(None);
        };
        let existing: UsageRecord = decode(&existing)?;
        let wallet_id = existing.wallet_id.clone();

        let reads = vec![
            DocRef::new(Collection::Usages, usage_id.clone()),
            DocRef::new(Collection::Wallets, wallet_id.as_str()),
        ];

        let mut result: Option<UsageStatus> = None;
        self.store.transaction(&reads, &mut |snap| {
            let Some(usage_doc) = snap.get(Collection::Usages, &usage_id) else {
                result = None;
                return Ok(Vec::new());
            };
            let usage: UsageRecord = decode(usage_doc)?;
            match usage.status {
                // Commit wins: the work was acknowledged.
                UsageStatus::Committed => {
                    result = Some(UsageStatus::Committed);
                    Ok(Vec::new())
                }
                UsageStatus::RolledBack => {
                    result = Some(UsageStatus::RolledBack);
                    Ok(Vec::new())
                }
                UsageStatus::Reserved => {
                    let mut writes = vec![WriteOp::merge(
                        Collection::Usages,
                        usage_id.clone(),
                        json!({ "status": UsageStatus::RolledBack, "updated_at": now }),
                    )];
                    if let Some(wallet_doc) = snap.get(Collection::Wallets, wallet_id.as_str()) {
                        let wallet: Wallet = decode(wallet_doc)?;
                        writes.push(WriteOp::merge(
                            Collection::Wallets,
                            wallet_id.as_str(),
                            json!({
                                "quota_used": wallet.quota_used.saturating_sub(usage.amount),
                                "updated_at": now,
                            }),
                        ));
                    }
                    result = Some(UsageStatus::RolledBack);
                    Ok(writes)
                }
            }
        })?;
        Ok(result)
    }
}
