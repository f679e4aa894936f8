//! Error types for the quota engine.

use aiorreal_quota_store::StoreError;

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, QuotaError>;

/// Errors that can occur in quota engine operations.
///
/// Not-found, quota exhaustion, and unresolvable plans are outcomes, not
/// errors: they surface as `None` or rejected reserve results. Errors here
/// are invalid input and data-layer failures, which callers retry;
/// idempotency keys make retries safe.
#[derive(Debug, thiserror::Error)]
pub enum QuotaError {
    /// A required input was missing or malformed.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The data layer failed; never masked by the engine.
    #[error(transparent)]
    Store(#[from] StoreError),
}
