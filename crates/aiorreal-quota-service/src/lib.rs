//! aiorreal quota HTTP API service.
//!
//! This crate is the thin HTTP shell over the quota engine:
//!
//! - Quota operations (ensure, snapshot, reserve, commit, rollback)
//! - Billing provider webhook ingestion
//!
//! # Authentication
//!
//! The service sits behind a trusted gateway that authenticates callers
//! and forwards the user id in the `x-user-id` header. Webhooks are
//! authenticated with an optional HMAC-SHA256 body signature.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
// Allow some pedantic lints that are noisy for Axum handler functions
#![allow(clippy::missing_errors_doc)] // Axum handlers all return Result
#![allow(clippy::unused_async)] // Handlers need async for the router

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use config::ServiceConfig;
pub use error::ApiError;
pub use routes::create_router;
pub use state::AppState;
