//! User record manager: upsert-only anchor for a user's existence in the
//! quota domain.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::json;

use aiorreal_quota_core::{UserId, UserRecord};
use aiorreal_quota_store::{Collection, DocumentStore};

use crate::codec::encode;
use crate::error::Result;

/// Manages the `users_quota` collection.
pub struct UserRecords<S> {
    store: Arc<S>,
}

impl<S> Clone for UserRecords<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: DocumentStore> UserRecords<S> {
    /// Create a user record manager.
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Create the user record if absent, otherwise bump `updated_at` (and
    /// email when supplied). Records are never deleted.
    pub fn ensure(
        &self,
        user_id: &UserId,
        email: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let existing = self.store.get(Collection::Users, user_id.as_str())?;
        if existing.is_none() {
            let record = UserRecord::new(user_id.clone(), email.map(str::to_owned), now);
            self.store
                .set(Collection::Users, user_id.as_str(), &encode(&record)?, false)?;
            tracing::info!(user_id = %user_id, "User record created");
            return Ok(());
        }

        let mut patch = json!({ "updated_at": now });
        if let Some(email) = email {
            patch["email"] = json!(email);
        }
        self.store
            .set(Collection::Users, user_id.as_str(), &patch, true)?;
        Ok(())
    }
}
