//! Request handlers.

pub mod health;
pub mod quota;
pub mod webhooks;
