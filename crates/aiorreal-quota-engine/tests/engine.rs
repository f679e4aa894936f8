//! End-to-end engine tests over the in-memory store.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;

use aiorreal_quota_core::{
    BillingEvent, PlanCatalog, RequestId, Subscription, SubscriptionStatus, TimestampInput,
    UsageStatus, UserId, Wallet, WalletId, WalletStatus,
};
use aiorreal_quota_engine::{PremiumHint, QuotaCore, ReserveStatus};
use aiorreal_quota_store::{Collection, DocumentStore, Filter, MemoryStore};

// ============================================================================
// Harness
// ============================================================================

fn engine() -> (QuotaCore<MemoryStore>, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let core = QuotaCore::new(Arc::clone(&store), PlanCatalog::default());
    (core, store)
}

fn premium_hint(product: &str) -> PremiumHint {
    PremiumHint {
        premium: true,
        entitlement_product_id: Some(product.to_owned()),
    }
}

fn billing_event(user: &str, event_id: Option<&str>, event_type: &str) -> BillingEvent {
    BillingEvent {
        user_id: UserId::from(user),
        event_id: event_id.map(str::to_owned),
        event_type: event_type.to_owned(),
        rc_app_user_id: Some(format!("rc-{user}")),
        product_id: None,
        entitlement_ids: vec!["premium".to_owned()],
        platform: Some("ios".to_owned()),
        will_renew: None,
        period_start: None,
        period_end: None,
        original_purchase_date: None,
        raw_event: serde_json::json!({"source": "test"}),
    }
}

fn active_wallets(store: &MemoryStore, user: &str) -> Vec<(String, Value)> {
    store
        .query(
            Collection::Wallets,
            &Filter::new().eq("user_id", user).eq("status", "active"),
        )
        .unwrap()
}

fn all_wallets(store: &MemoryStore, user: &str) -> Vec<(String, Value)> {
    store
        .query(Collection::Wallets, &Filter::new().eq("user_id", user))
        .unwrap()
}

fn setup_premium(core: &QuotaCore<MemoryStore>, user: &str) {
    core.ensure_quota(
        &UserId::from(user),
        Some(&premium_hint("com.app.aiorreal-monthly")),
    )
    .unwrap()
    .unwrap();
}

// ============================================================================
// EnsureQuota / GetSnapshot
// ============================================================================

#[test]
fn ensure_quota_without_hint_defaults_to_free() {
    let (core, _store) = engine();
    let user = UserId::from("u-free");

    let snapshot = core.ensure_quota(&user, None).unwrap().unwrap();
    assert_eq!(snapshot.plan_id.as_deref(), Some("free"));
    assert!(!snapshot.is_active);
    assert_eq!(snapshot.quota_total, 2);
    assert_eq!(snapshot.quota_remaining, 2);
    assert!(snapshot.wallet_id.is_some());
}

#[test]
fn ensure_quota_premium_monthly() {
    let (core, store) = engine();
    let user = UserId::from("u-prem");

    let snapshot = core
        .ensure_quota(&user, Some(&premium_hint("store.aiorreal-monthly.v1")))
        .unwrap()
        .unwrap();
    assert_eq!(snapshot.plan_id.as_deref(), Some("premium_monthly"));
    assert!(snapshot.is_active);
    assert!(snapshot.will_renew);
    assert_eq!(snapshot.quota_total, 100);
    assert_eq!(active_wallets(&store, "u-prem").len(), 1);
}

#[test]
fn ensure_quota_premium_yearly_product() {
    let (core, _store) = engine();
    let user = UserId::from("u-year");

    let snapshot = core
        .ensure_quota(&user, Some(&premium_hint("aiorreal-annual")))
        .unwrap()
        .unwrap();
    assert_eq!(snapshot.plan_id.as_deref(), Some("premium_yearly"));
    assert_eq!(snapshot.quota_total, 1000);
}

#[test]
fn ensure_quota_is_idempotent_for_wallets() {
    let (core, store) = engine();
    let user = UserId::from("u-same");

    setup_premium(&core, "u-same");
    let first = active_wallets(&store, "u-same");
    core.ensure_quota(&user, Some(&premium_hint("com.app.aiorreal-monthly")))
        .unwrap();
    let second = active_wallets(&store, "u-same");

    assert_eq!(first.len(), 1);
    assert_eq!(second.len(), 1);
    assert_eq!(first[0].0, second[0].0, "wallet must not be reopened");
}

#[test]
fn negative_hint_does_not_demote_active_premium() {
    let (core, store) = engine();
    let user = UserId::from("u-keep");
    setup_premium(&core, "u-keep");
    let wallets_before = active_wallets(&store, "u-keep");

    // A transiently wrong oracle read must not tear down the paid plan.
    let snapshot = core
        .ensure_quota(
            &user,
            Some(&PremiumHint {
                premium: false,
                entitlement_product_id: None,
            }),
        )
        .unwrap()
        .unwrap();

    assert_eq!(snapshot.plan_id.as_deref(), Some("premium_monthly"));
    assert!(snapshot.is_active);
    assert_eq!(snapshot.quota_total, 100);
    assert_eq!(active_wallets(&store, "u-keep"), wallets_before);
}

#[test]
fn negative_hint_lands_inactive_user_on_free() {
    let (core, _store) = engine();
    let user = UserId::from("u-down");
    setup_premium(&core, "u-down");
    core.process_billing_event(&billing_event("u-down", Some("evt-refund"), "REFUND"))
        .unwrap();

    // The subscription is no longer active, so the oracle's negative
    // report settles the user on the free tier.
    let snapshot = core
        .ensure_quota(
            &user,
            Some(&PremiumHint {
                premium: false,
                entitlement_product_id: None,
            }),
        )
        .unwrap()
        .unwrap();

    assert_eq!(snapshot.plan_id.as_deref(), Some("free"));
    assert!(!snapshot.is_active);
    assert_eq!(snapshot.quota_total, 2);
    assert_eq!(snapshot.quota_remaining, 2);
}

#[test]
fn snapshot_for_unknown_user_is_none() {
    let (core, _store) = engine();
    assert!(core.get_snapshot(&UserId::from("nobody")).unwrap().is_none());
}

#[test]
fn ensure_quota_empty_user_is_none() {
    let (core, _store) = engine();
    assert!(core.ensure_quota(&UserId::from(""), None).unwrap().is_none());
}

// ============================================================================
// Reserve / Commit / Rollback
// ============================================================================

#[test]
fn free_user_reserves_twice_then_rejected() {
    let (core, _store) = engine();
    let user = UserId::from("u1");
    core.ensure_quota(&user, None).unwrap();

    let r1 = core
        .reserve(&user, &RequestId::from("r1"), "ai_detect", 1)
        .unwrap();
    assert!(r1.allowed);
    assert_eq!(r1.status, ReserveStatus::Reserved);
    assert_eq!(r1.remaining, 1);

    let r2 = core
        .reserve(&user, &RequestId::from("r2"), "ai_detect", 1)
        .unwrap();
    assert!(r2.allowed);
    assert_eq!(r2.remaining, 0);

    let r3 = core
        .reserve(&user, &RequestId::from("r3"), "ai_detect", 1)
        .unwrap();
    assert!(!r3.allowed);
    assert_eq!(r3.status, ReserveStatus::Rejected);
    assert_eq!(r3.remaining, 0);
}

#[test]
fn reserve_replay_returns_same_outcome() {
    let (core, _store) = engine();
    let user = UserId::from("u2");
    setup_premium(&core, "u2");

    // Warm the wallet to quota_used = 5.
    let warm = core
        .reserve(&user, &RequestId::from("warmup"), "ai_detect", 5)
        .unwrap();
    assert!(warm.allowed);

    let first = core
        .reserve(&user, &RequestId::from("r1"), "ai_detect", 1)
        .unwrap();
    assert!(first.allowed);
    assert_eq!(first.remaining, 94);

    // Network retry: same request id, wallet unchanged.
    let replay = core
        .reserve(&user, &RequestId::from("r1"), "ai_detect", 1)
        .unwrap();
    assert!(replay.allowed);
    assert_eq!(replay.status, ReserveStatus::Reserved);
    assert_eq!(replay.remaining, 94);
    assert_eq!(replay.wallet_id, first.wallet_id);

    let snapshot = core.get_snapshot(&user).unwrap().unwrap();
    assert_eq!(snapshot.quota_used, 6);
}

#[test]
fn reserve_rollback_restores_wallet() {
    let (core, _store) = engine();
    let user = UserId::from("u3");
    setup_premium(&core, "u3");

    let before = core.get_snapshot(&user).unwrap().unwrap().quota_used;
    core.reserve(&user, &RequestId::from("r1"), "ai_detect", 3)
        .unwrap();

    let rolled = core.rollback(&user, &RequestId::from("r1")).unwrap();
    assert_eq!(rolled, Some(UsageStatus::RolledBack));

    let after = core.get_snapshot(&user).unwrap().unwrap().quota_used;
    assert_eq!(after, before);

    // Replay of a rolled-back reservation is not allowed.
    let replay = core
        .reserve(&user, &RequestId::from("r1"), "ai_detect", 3)
        .unwrap();
    assert!(!replay.allowed);
    assert_eq!(replay.status, ReserveStatus::RolledBack);
}

#[test]
fn commit_is_terminal_and_idempotent() {
    let (core, _store) = engine();
    let user = UserId::from("u4");
    setup_premium(&core, "u4");

    core.reserve(&user, &RequestId::from("r1"), "ai_detect", 1)
        .unwrap();
    assert_eq!(
        core.commit(&user, &RequestId::from("r1")).unwrap(),
        Some(UsageStatus::Committed)
    );
    assert_eq!(
        core.commit(&user, &RequestId::from("r1")).unwrap(),
        Some(UsageStatus::Committed)
    );
}

#[test]
fn rollback_after_commit_is_ignored() {
    let (core, _store) = engine();
    let user = UserId::from("u5");
    setup_premium(&core, "u5");

    core.reserve(&user, &RequestId::from("r1"), "ai_detect", 2)
        .unwrap();
    core.commit(&user, &RequestId::from("r1")).unwrap();

    // Commit wins; the debit stays.
    let result = core.rollback(&user, &RequestId::from("r1")).unwrap();
    assert_eq!(result, Some(UsageStatus::Committed));

    let snapshot = core.get_snapshot(&user).unwrap().unwrap();
    assert_eq!(snapshot.quota_used, 2);
}

#[test]
fn commit_and_rollback_unknown_request_are_none() {
    let (core, _store) = engine();
    let user = UserId::from("u6");
    setup_premium(&core, "u6");

    assert!(core.commit(&user, &RequestId::from("ghost")).unwrap().is_none());
    assert!(core
        .rollback(&user, &RequestId::from("ghost"))
        .unwrap()
        .is_none());
}

#[test]
fn reserve_empty_request_id_is_rejected() {
    let (core, _store) = engine();
    let user = UserId::from("u7");
    setup_premium(&core, "u7");

    let outcome = core
        .reserve(&user, &RequestId::from(""), "ai_detect", 1)
        .unwrap();
    assert!(!outcome.allowed);
    assert_eq!(outcome.status, ReserveStatus::Rejected);
}

#[test]
fn reserve_without_subscription_is_rejected() {
    let (core, _store) = engine();
    let outcome = core
        .reserve(&UserId::from("stranger"), &RequestId::from("r1"), "ai_detect", 1)
        .unwrap();
    assert!(!outcome.allowed);
    assert_eq!(outcome.status, ReserveStatus::Rejected);
}

#[test]
fn reserve_last_unit_boundary() {
    let (core, _store) = engine();
    let user = UserId::from("u8");
    setup_premium(&core, "u8");

    // Drive the wallet to quota_used = quota_total - 1.
    let big = core
        .reserve(&user, &RequestId::from("bulk"), "ai_detect", 99)
        .unwrap();
    assert!(big.allowed);
    assert_eq!(big.remaining, 1);

    let last = core
        .reserve(&user, &RequestId::from("last"), "ai_detect", 1)
        .unwrap();
    assert!(last.allowed);
    assert_eq!(last.remaining, 0);

    let over = core
        .reserve(&user, &RequestId::from("over"), "ai_detect", 1)
        .unwrap();
    assert!(!over.allowed);
    assert_eq!(over.remaining, 0);
}

#[test]
fn oversized_reserve_leaves_wallet_untouched() {
    let (core, _store) = engine();
    let user = UserId::from("u9");
    core.ensure_quota(&user, None).unwrap();

    let outcome = core
        .reserve(&user, &RequestId::from("r1"), "ai_detect", 5)
        .unwrap();
    assert!(!outcome.allowed);
    assert_eq!(outcome.remaining, 2);

    let snapshot = core.get_snapshot(&user).unwrap().unwrap();
    assert_eq!(snapshot.quota_used, 0);
}

#[test]
fn quota_used_never_exceeds_total() {
    let (core, _store) = engine();
    let user = UserId::from("u10");
    core.ensure_quota(&user, None).unwrap();

    for i in 0..10 {
        let id = RequestId::from(format!("r{i}"));
        core.reserve(&user, &id, "ai_detect", 1).unwrap();
        if i % 3 == 0 {
            core.rollback(&user, &id).unwrap();
        } else {
            core.commit(&user, &id).unwrap();
        }
        let snapshot = core.get_snapshot(&user).unwrap().unwrap();
        assert!(snapshot.quota_used <= snapshot.quota_total);
    }
}

#[test]
fn concurrent_reserves_respect_the_budget() {
    let (core, _store) = engine();
    let user = UserId::from("u11");
    setup_premium(&core, "u11");

    let core = Arc::new(core);
    let mut handles = Vec::new();
    for t in 0..4 {
        let core = Arc::clone(&core);
        let user = user.clone();
        handles.push(std::thread::spawn(move || {
            let mut allowed = 0;
            for i in 0..30 {
                let id = RequestId::from(format!("t{t}-r{i}"));
                // Conflicts are transient; retry like a real caller.
                loop {
                    match core.reserve(&user, &id, "ai_detect", 1) {
                        Ok(outcome) => {
                            if outcome.allowed {
                                allowed += 1;
                            }
                            break;
                        }
                        Err(aiorreal_quota_engine::QuotaError::Store(
                            aiorreal_quota_store::StoreError::Conflict { .. },
                        )) => {}
                        Err(e) => panic!("unexpected error: {e}"),
                    }
                }
            }
            allowed
        }));
    }
    let total_allowed: u32 = handles.into_iter().map(|h| h.join().unwrap()).sum();

    // 120 attempts against a budget of 100.
    assert_eq!(total_allowed, 100);
    let snapshot = core.get_snapshot(&user).unwrap().unwrap();
    assert_eq!(snapshot.quota_used, 100);
}

// ============================================================================
// Billing events
// ============================================================================

#[test]
fn refund_forfeits_remaining_and_blocks_reserve() {
    let (core, store) = engine();
    let user = UserId::from("u12");
    setup_premium(&core, "u12");
    core.reserve(&user, &RequestId::from("work"), "ai_detect", 30)
        .unwrap();

    let event = billing_event("u12", Some("evt-refund"), "REFUND");
    core.process_billing_event(&event).unwrap();

    let sub_doc = store
        .get(Collection::Subscriptions, "u12")
        .unwrap()
        .unwrap();
    let sub: Subscription = serde_json::from_value(sub_doc).unwrap();
    assert_eq!(sub.status, SubscriptionStatus::Refunded);
    assert!(!sub.is_active);

    assert!(active_wallets(&store, "u12").is_empty());
    let wallets = all_wallets(&store, "u12");
    assert_eq!(wallets.len(), 1);
    let wallet: Wallet = serde_json::from_value(wallets[0].1.clone()).unwrap();
    assert_eq!(wallet.status, WalletStatus::Closed);
    assert_eq!(wallet.quota_used, wallet.quota_total);
    assert_eq!(
        wallet.closed_reason,
        Some(aiorreal_quota_core::CloseReason::Refunded)
    );

    let outcome = core
        .reserve(&user, &RequestId::from("after"), "ai_detect", 1)
        .unwrap();
    assert!(!outcome.allowed);
}

#[test]
fn plan_change_monthly_to_yearly_resets_wallet() {
    let (core, store) = engine();
    let user = UserId::from("u13");
    setup_premium(&core, "u13");
    core.reserve(&user, &RequestId::from("work"), "ai_detect", 30)
        .unwrap();

    let mut event = billing_event("u13", Some("evt-change"), "PRODUCT_CHANGE");
    event.product_id = Some("com.app.aiorreal-yearly".to_owned());
    event.period_end = Some(TimestampInput::Text("2027-08-01T00:00:00Z".to_owned()));
    core.process_billing_event(&event).unwrap();

    let sub_doc = store
        .get(Collection::Subscriptions, "u13")
        .unwrap()
        .unwrap();
    let sub: Subscription = serde_json::from_value(sub_doc).unwrap();
    assert_eq!(sub.plan_id.as_deref(), Some("premium_yearly"));

    let actives = active_wallets(&store, "u13");
    assert_eq!(actives.len(), 1);
    let fresh: Wallet = serde_json::from_value(actives[0].1.clone()).unwrap();
    assert_eq!(fresh.quota_total, 1000);
    assert_eq!(fresh.quota_used, 0);

    // The old monthly wallet keeps its history; remaining is not forfeited.
    let old: Wallet = all_wallets(&store, "u13")
        .into_iter()
        .map(|(_, doc)| serde_json::from_value(doc).unwrap())
        .find(|w: &Wallet| w.status == WalletStatus::Closed)
        .unwrap();
    assert_eq!(old.quota_used, 30);
    assert_eq!(
        old.closed_reason,
        Some(aiorreal_quota_core::CloseReason::PlanChange)
    );
}

#[test]
fn duplicate_webhook_is_dropped() {
    let (core, store) = engine();
    let user = UserId::from("u14");

    let mut event = billing_event("u14", Some("evt-1"), "INITIAL_PURCHASE");
    event.product_id = Some("aiorreal-monthly".to_owned());
    event.period_end = Some(TimestampInput::Text("2026-09-01T00:00:00Z".to_owned()));

    core.process_billing_event(&event).unwrap();
    let wallets_after_first = active_wallets(&store, "u14");
    let sub_after_first = store.get(Collection::Subscriptions, "u14").unwrap();

    // Replays must not touch subscription or wallets.
    core.process_billing_event(&event).unwrap();
    core.process_billing_event(&event).unwrap();

    assert_eq!(active_wallets(&store, "u14"), wallets_after_first);
    assert_eq!(
        store.get(Collection::Subscriptions, "u14").unwrap(),
        sub_after_first
    );

    let snapshot = core.get_snapshot(&user).unwrap().unwrap();
    assert_eq!(snapshot.quota_total, 100);
}

#[test]
fn webhook_without_event_id_dedups_by_hash() {
    let (core, store) = engine();

    let mut event = billing_event("u15", None, "RENEWAL");
    event.product_id = Some("aiorreal-monthly".to_owned());
    event.period_start = Some(TimestampInput::Epoch(1_756_684_800.0));
    event.period_end = Some(TimestampInput::Epoch(1_759_276_800.0));

    core.process_billing_event(&event).unwrap();
    core.process_billing_event(&event).unwrap();

    let events = store
        .query(Collection::WebhookEvents, &Filter::new())
        .unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].1["status"], "processed");
    assert_eq!(active_wallets(&store, "u15").len(), 1);
}

#[test]
fn billing_issue_suspends_access() {
    let (core, store) = engine();
    let user = UserId::from("u16");
    setup_premium(&core, "u16");

    let event = billing_event("u16", Some("evt-bi"), "BILLING_ISSUE_DETECTED");
    core.process_billing_event(&event).unwrap();

    let sub: Subscription =
        serde_json::from_value(store.get(Collection::Subscriptions, "u16").unwrap().unwrap())
            .unwrap();
    assert_eq!(sub.status, SubscriptionStatus::BillingIssue);
    assert!(!sub.is_active);
    assert!(active_wallets(&store, "u16").is_empty());

    let outcome = core
        .reserve(&user, &RequestId::from("r1"), "ai_detect", 1)
        .unwrap();
    assert!(!outcome.allowed);
}

#[test]
fn cancellation_keeps_access_until_period_end() {
    let (core, store) = engine();
    let user = UserId::from("u17");
    setup_premium(&core, "u17");

    let event = billing_event("u17", Some("evt-cancel"), "CANCELLATION");
    core.process_billing_event(&event).unwrap();

    let sub: Subscription =
        serde_json::from_value(store.get(Collection::Subscriptions, "u17").unwrap().unwrap())
            .unwrap();
    assert_eq!(sub.status, SubscriptionStatus::Cancelled);
    assert!(sub.is_active);
    assert!(!sub.will_renew);

    // Still usable until the period lapses.
    let outcome = core
        .reserve(&user, &RequestId::from("r1"), "ai_detect", 1)
        .unwrap();
    assert!(outcome.allowed);
}

#[test]
fn unknown_event_type_keeps_existing_status() {
    let (core, store) = engine();
    setup_premium(&core, "u18");

    let event = billing_event("u18", Some("evt-odd"), "TRANSFER");
    core.process_billing_event(&event).unwrap();

    let sub: Subscription =
        serde_json::from_value(store.get(Collection::Subscriptions, "u18").unwrap().unwrap())
            .unwrap();
    assert_eq!(sub.status, SubscriptionStatus::Active);
    assert!(sub.last_event_at.is_some());
}

#[test]
fn one_active_wallet_after_event_sequence() {
    let (core, store) = engine();

    let mut purchase = billing_event("u19", Some("e1"), "INITIAL_PURCHASE");
    purchase.product_id = Some("aiorreal-monthly".to_owned());
    purchase.period_end = Some(TimestampInput::Text("2026-09-01T00:00:00Z".to_owned()));
    core.process_billing_event(&purchase).unwrap();

    let mut renewal = billing_event("u19", Some("e2"), "RENEWAL");
    renewal.product_id = Some("aiorreal-monthly".to_owned());
    renewal.period_end = Some(TimestampInput::Text("2026-10-01T00:00:00Z".to_owned()));
    core.process_billing_event(&renewal).unwrap();

    let mut change = billing_event("u19", Some("e3"), "PRODUCT_CHANGE");
    change.product_id = Some("aiorreal-yearly".to_owned());
    change.period_end = Some(TimestampInput::Text("2027-10-01T00:00:00Z".to_owned()));
    core.process_billing_event(&change).unwrap();

    core.ensure_quota(&UserId::from("u19"), Some(&premium_hint("aiorreal-yearly")))
        .unwrap();

    assert_eq!(active_wallets(&store, "u19").len(), 1);
}

// ============================================================================
// Wallet lifecycle edge cases
// ============================================================================

fn seed_subscription(store: &MemoryStore, user: &str, period_end: Option<DateTime<Utc>>) {
    let now = Utc::now();
    let sub = Subscription {
        user_id: UserId::from(user),
        platform: None,
        rc_app_user_id: None,
        product_id: None,
        plan_id: Some("premium_monthly".to_owned()),
        plan_key: Some("premium".to_owned()),
        cycle: Some(aiorreal_quota_core::BillingCycle::Monthly),
        entitlement_ids: Vec::new(),
        is_active: true,
        will_renew: true,
        status: SubscriptionStatus::Active,
        current_period_start: period_end.map(|_| now - chrono::Duration::days(30)),
        current_period_end: period_end,
        last_event_at: None,
        original_purchase_date: None,
        created_at: now,
        updated_at: now,
    };
    store
        .set(
            Collection::Subscriptions,
            user,
            &serde_json::to_value(&sub).unwrap(),
            false,
        )
        .unwrap();
}

fn seed_wallet(store: &MemoryStore, id: &str, user: &str, period_end: DateTime<Utc>, used: u32) {
    let now = Utc::now();
    let wallet = Wallet {
        id: WalletId::from(id),
        user_id: UserId::from(user),
        subscription_id: Some(user.to_owned()),
        plan_id: Some("premium_monthly".to_owned()),
        scope: aiorreal_quota_core::BillingCycle::Monthly,
        period_start: Some(period_end - chrono::Duration::days(30)),
        period_end: Some(period_end),
        quota_total: 100,
        quota_used: used,
        status: WalletStatus::Active,
        last_usage_at: None,
        closed_reason: None,
        created_at: now,
        updated_at: now,
    };
    store
        .set(
            Collection::Wallets,
            id,
            &serde_json::to_value(&wallet).unwrap(),
            false,
        )
        .unwrap();
}

#[test]
fn lapsed_wallet_rolls_over_on_reserve() {
    let (core, store) = engine();
    let user = "u20";
    let future = Utc::now() + chrono::Duration::days(10);
    seed_subscription(&store, user, Some(future));
    seed_wallet(&store, "w-old", user, Utc::now() - chrono::Duration::days(1), 80);

    let outcome = core
        .reserve(&UserId::from(user), &RequestId::from("r1"), "ai_detect", 1)
        .unwrap();
    assert!(outcome.allowed);
    assert_eq!(outcome.remaining, 99);

    let actives = active_wallets(&store, user);
    assert_eq!(actives.len(), 1);
    assert_ne!(actives[0].0, "w-old");

    let old: Wallet =
        serde_json::from_value(store.get(Collection::Wallets, "w-old").unwrap().unwrap()).unwrap();
    assert_eq!(old.status, WalletStatus::Closed);
    assert_eq!(
        old.closed_reason,
        Some(aiorreal_quota_core::CloseReason::PeriodReset)
    );
    // Rollover keeps history; remaining is not forfeited.
    assert_eq!(old.quota_used, 80);
}

#[test]
fn stale_wallet_kept_when_subscription_lacks_period() {
    let (core, store) = engine();
    let user = "u21";
    seed_subscription(&store, user, None);
    seed_wallet(&store, "w-stale", user, Utc::now() - chrono::Duration::days(1), 10);

    // The wallet has lapsed but the subscription has no period to roll
    // into; the stale wallet is reused as-is.
    let outcome = core
        .reserve(&UserId::from(user), &RequestId::from("r1"), "ai_detect", 1)
        .unwrap();
    assert!(outcome.allowed);
    assert_eq!(outcome.wallet_id, Some(WalletId::from("w-stale")));

    let actives = active_wallets(&store, user);
    assert_eq!(actives.len(), 1);
    assert_eq!(actives[0].0, "w-stale");
}

#[test]
fn duplicate_active_wallets_are_repaired() {
    let (core, store) = engine();
    let user = "u22";
    let future = Utc::now() + chrono::Duration::days(10);
    seed_subscription(&store, user, Some(future));
    seed_wallet(&store, "w-older", user, future - chrono::Duration::days(5), 40);
    seed_wallet(&store, "w-newer", user, future, 10);

    let outcome = core
        .reserve(&UserId::from(user), &RequestId::from("r1"), "ai_detect", 1)
        .unwrap();
    assert!(outcome.allowed);
    // Most recent by period_end wins.
    assert_eq!(outcome.wallet_id, Some(WalletId::from("w-newer")));

    let actives = active_wallets(&store, user);
    assert_eq!(actives.len(), 1);
    assert_eq!(actives[0].0, "w-newer");
}
