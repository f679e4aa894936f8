//! User record: anchors a user's existence in the quota domain.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::UserId;

/// A user record, id = user id. Created lazily, never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    /// The user id.
    pub id: UserId,

    /// Email, when the gateway supplies one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// When the record was created.
    pub created_at: DateTime<Utc>,

    /// When the record was last touched.
    pub updated_at: DateTime<Utc>,
}

impl UserRecord {
    /// Create a fresh record for a user.
    #[must_use]
    pub fn new(id: UserId, email: Option<String>, now: DateTime<Utc>) -> Self {
        Self {
            id,
            email,
            created_at: now,
            updated_at: now,
        }
    }
}
