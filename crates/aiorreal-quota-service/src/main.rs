//! aiorreal quota service - HTTP API entry point.

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use aiorreal_quota_service::{create_router, AppState, ServiceConfig};
use aiorreal_quota_store::RocksStore;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,aiorreal_quota=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting aiorreal quota service");

    let config = ServiceConfig::from_env();
    tracing::info!(
        listen_addr = %config.listen_addr,
        data_dir = %config.data_dir,
        webhook_signing = %config.webhook_secret.is_some(),
        catalog_override = %config.plan_catalog_json.is_some(),
        "Service configuration loaded"
    );

    tracing::info!(path = %config.data_dir, "Opening RocksDB store");
    let store = Arc::new(RocksStore::open(&config.data_dir)?);

    let state = AppState::new(store, config.clone());
    let app = create_router(state);

    tracing::info!(listen_addr = %config.listen_addr, "Starting HTTP server");
    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
