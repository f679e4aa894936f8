//! Application state.

use std::sync::Arc;

use aiorreal_quota_engine::QuotaCore;
use aiorreal_quota_store::RocksStore;

use crate::config::ServiceConfig;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// The quota engine.
    pub core: QuotaCore<RocksStore>,

    /// Service configuration.
    pub config: ServiceConfig,
}

impl AppState {
    /// Create a new application state.
    #[must_use]
    pub fn new(store: Arc<RocksStore>, config: ServiceConfig) -> Self {
        let catalog = config.plan_catalog();
        tracing::info!(
            plan_count = catalog.plans().len(),
            webhook_signing = config.webhook_secret.is_some(),
            "Quota engine configured"
        );
        let core = QuotaCore::new(store, catalog);
        Self { core, config }
    }
}
