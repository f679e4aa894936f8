//! Usage records: pending and settled debits against a wallet.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{RequestId, UserId, WalletId};

/// Lifecycle state of a usage record.
///
/// `reserved` is the only non-terminal state; `committed` and `rolled_back`
/// are sinks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageStatus {
    /// Debited from the wallet, awaiting commit or rollback.
    Reserved,
    /// The work was acknowledged; the debit is final.
    Committed,
    /// The debit was refunded to the wallet.
    RolledBack,
}

impl UsageStatus {
    /// Get the status name as a string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Reserved => "reserved",
            Self::Committed => "committed",
            Self::RolledBack => "rolled_back",
        }
    }

    /// Whether the record has reached a terminal state.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Committed | Self::RolledBack)
    }
}

/// A reservation against a wallet, keyed by `{user_id}_{request_id}`.
///
/// The composite document id makes reservation idempotent: a retried
/// reserve observes the existing record and returns the same outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageRecord {
    /// The owning user.
    pub user_id: UserId,

    /// The wallet the reservation debited.
    pub wallet_id: WalletId,

    /// Client-supplied idempotency key.
    pub request_id: RequestId,

    /// Billable action name (e.g. `ai_detect`).
    pub action: String,

    /// Units debited. Always at least 1.
    pub amount: u32,

    /// Lifecycle state.
    pub status: UsageStatus,

    /// When the record was created.
    pub created_at: DateTime<Utc>,

    /// When the record was last updated.
    pub updated_at: DateTime<Utc>,
}

/// Document id for a usage record.
#[must_use]
pub fn usage_doc_id(user_id: &UserId, request_id: &RequestId) -> String {
    format!("{user_id}_{request_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doc_id_is_composite() {
        let id = usage_doc_id(&UserId::from("u1"), &RequestId::from("r42"));
        assert_eq!(id, "u1_r42");
    }

    #[test]
    fn terminal_states() {
        assert!(!UsageStatus::Reserved.is_terminal());
        assert!(UsageStatus::Committed.is_terminal());
        assert!(UsageStatus::RolledBack.is_terminal());
    }

    #[test]
    fn status_serializes_snake_case() {
        assert_eq!(
            serde_json::to_value(UsageStatus::RolledBack).unwrap(),
            "rolled_back"
        );
    }
}
