//! Core types for the aiorreal quota & subscription engine.
//!
//! This crate provides the foundational types used throughout the quota
//! platform:
//!
//! - **Identifiers**: `UserId`, `WalletId`, `RequestId`
//! - **Plans**: `PlanConfig`, `PlanCatalog`, `BillingCycle`
//! - **Subscriptions**: `Subscription`, `SubscriptionStatus`
//! - **Wallets**: `Wallet`, `WalletStatus`, `CloseReason`
//! - **Usage**: `UsageRecord`, `UsageStatus`
//! - **Webhooks**: `BillingEvent`, `EventKind`, `WebhookEventRecord`
//! - **Snapshots**: `QuotaSnapshot`
//!
//! # Quota Unit
//!
//! Quota is counted in whole billable actions (e.g. one `ai_detect` call is
//! one unit). Amounts are stored as `u32`; a wallet can never consume more
//! than its `quota_total`.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod event;
pub mod ids;
pub mod plan;
pub mod snapshot;
pub mod subscription;
pub mod time;
pub mod usage;
pub mod user;
pub mod wallet;

pub use event::{BillingEvent, EventKind, WebhookEventRecord, WebhookStatus};
pub use ids::{RequestId, UserId, WalletId};
pub use plan::{BillingCycle, PlanCatalog, PlanConfig, FREE_PLAN_ID};
pub use snapshot::QuotaSnapshot;
pub use subscription::{Subscription, SubscriptionStatus};
pub use time::{normalize_timestamp, synthetic_period, TimestampInput};
pub use usage::{usage_doc_id, UsageRecord, UsageStatus};
pub use user::UserRecord;
pub use wallet::{CloseReason, Wallet, WalletStatus};
