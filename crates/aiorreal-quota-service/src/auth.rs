//! Caller identity extraction.
//!
//! Authentication happens upstream: the gateway validates the caller and
//! forwards a trusted user id in the `x-user-id` header. This extractor
//! only enforces presence; it never validates credentials.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use aiorreal_quota_core::UserId;

use crate::error::ApiError;

/// Header carrying the gateway-authenticated user id.
pub const USER_ID_HEADER: &str = "x-user-id";

/// The authenticated user for a request.
#[derive(Debug, Clone)]
pub struct AuthUser {
    /// The trusted user id.
    pub user_id: UserId,
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or(ApiError::Unauthorized)?;

        Ok(Self {
            user_id: UserId::from(user_id),
        })
    }
}
