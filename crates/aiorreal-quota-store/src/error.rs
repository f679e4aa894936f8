//! Error types for quota storage.

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur in storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database operation failed.
    #[error("database error: {0}")]
    Database(String),

    /// Serialization/deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A document was not a JSON object or failed domain decoding.
    #[error("invalid document: {0}")]
    InvalidDocument(String),

    /// Optimistic transaction conflict persisted through all retries.
    ///
    /// Transient; callers retry the whole operation.
    #[error("transaction conflict after {attempts} attempts")]
    Conflict {
        /// How many attempts were made before giving up.
        attempts: u32,
    },
}
