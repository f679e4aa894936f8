//! Common test utilities for quota service integration tests.

#![allow(dead_code)] // Some utilities are used by different test files

use std::sync::Arc;

use axum::Router;
use axum_test::TestServer;
use tempfile::TempDir;

use aiorreal_quota_service::{create_router, AppState, ServiceConfig};
use aiorreal_quota_store::RocksStore;

/// Test harness containing everything needed for integration tests.
pub struct TestHarness {
    /// The test server for making HTTP requests.
    pub server: TestServer,
    /// Temporary directory for the database (kept alive for test duration).
    pub _temp_dir: TempDir,
    /// A test user id for authenticated requests.
    pub user_id: String,
}

impl TestHarness {
    /// Create a new test harness with a fresh database.
    pub fn new() -> Self {
        Self::with_config(ServiceConfig::default())
    }

    /// Create a harness with webhook signing enabled.
    pub fn with_webhook_secret(secret: &str) -> Self {
        Self::with_config(ServiceConfig {
            webhook_secret: Some(secret.to_owned()),
            ..ServiceConfig::default()
        })
    }

    fn with_config(mut config: ServiceConfig) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store = RocksStore::open(temp_dir.path()).expect("Failed to open store");
        config.data_dir = temp_dir.path().to_string_lossy().to_string();

        let state = AppState::new(Arc::new(store), config);
        let router: Router = create_router(state);
        let server = TestServer::new(router).expect("Failed to create test server");

        Self {
            server,
            _temp_dir: temp_dir,
            user_id: "test-user-1".to_owned(),
        }
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
