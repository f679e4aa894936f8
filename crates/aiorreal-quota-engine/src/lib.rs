//! Quota & subscription state engine for aiorreal.
//!
//! Mediates between the in-app-purchase provider's webhooks and each
//! user's metered-usage budget. For every authenticated user it answers
//! two questions atomically: is a requested billable action allowed right
//! now, and how should subscription and wallet state transition in
//! response to a billing event.
//!
//! # Components
//!
//! - [`UserRecords`]: upsert-only user anchor
//! - [`SubscriptionManager`]: plan-sync projection into `subscriptions_quota`
//! - [`WalletManager`]: wallet lifecycle, one active wallet per user
//! - [`UsageLedger`]: reserve → commit/rollback under store transactions
//! - [`WebhookProcessor`]: event dedup and state transitions
//! - [`QuotaCore`]: the facade composing the above
//!
//! # Guarantees
//!
//! - At-most-once consumption per client request id
//! - At-most-once processing per webhook event id
//! - `0 ≤ quota_used ≤ quota_total` on active wallets
//! - One active wallet per user, restored by the next write path if
//!   violated

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

mod codec;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod subscriptions;
pub mod users;
pub mod wallets;
pub mod webhooks;

pub use engine::{PremiumHint, QuotaCore};
pub use error::{QuotaError, Result};
pub use ledger::{ReserveOutcome, ReserveStatus, UsageLedger};
pub use subscriptions::SubscriptionManager;
pub use users::UserRecords;
pub use wallets::WalletManager;
pub use webhooks::WebhookProcessor;
