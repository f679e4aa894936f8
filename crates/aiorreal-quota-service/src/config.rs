//! Service configuration.

use aiorreal_quota_core::PlanCatalog;

/// Service configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Address to listen on (default: "0.0.0.0:8080").
    pub listen_addr: String,

    /// Path to the `RocksDB` data directory (default: "/data/aiorreal-quota").
    pub data_dir: String,

    /// Webhook HMAC secret. When unset, signature verification is skipped
    /// (development mode).
    pub webhook_secret: Option<String>,

    /// Plan catalog override as a JSON string (optional).
    pub plan_catalog_json: Option<String>,

    /// CORS allowed origins.
    pub cors_origins: Vec<String>,

    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,

    /// Request timeout in seconds.
    pub request_timeout_seconds: u64,
}

impl ServiceConfig {
    /// Load configuration from environment variables.
    ///
    /// `PLAN_CATALOG` supplies the catalog override inline;
    /// `PLAN_CATALOG_PATH` points at a file holding the same shape. Inline
    /// wins when both are set. An unreadable path logs a warning and is
    /// ignored; startup never fails on catalog configuration.
    #[must_use]
    pub fn from_env() -> Self {
        let plan_catalog_json = std::env::var("PLAN_CATALOG").ok().or_else(|| {
            let path = std::env::var("PLAN_CATALOG_PATH").ok()?;
            match std::fs::read_to_string(&path) {
                Ok(contents) => {
                    tracing::info!(path = %path, "Loaded plan catalog override from file");
                    Some(contents)
                }
                Err(e) => {
                    tracing::warn!(path = %path, error = %e, "Cannot read plan catalog file");
                    None
                }
            }
        });

        Self {
            listen_addr: std::env::var("LISTEN_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".into()),
            data_dir: std::env::var("DATA_DIR").unwrap_or_else(|_| "/data/aiorreal-quota".into()),
            webhook_secret: std::env::var("WEBHOOK_SECRET").ok(),
            plan_catalog_json,
            cors_origins: std::env::var("CORS_ORIGINS")
                .unwrap_or_else(|_| "*".into())
                .split(',')
                .map(|s| s.trim().to_string())
                .collect(),
            max_body_bytes: std::env::var("MAX_BODY_BYTES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(1024 * 1024), // 1MB
            request_timeout_seconds: std::env::var("REQUEST_TIMEOUT_SECONDS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(30),
        }
    }

    /// Build the plan catalog from the configured override, falling back to
    /// the embedded defaults on any parse failure.
    #[must_use]
    pub fn plan_catalog(&self) -> PlanCatalog {
        PlanCatalog::from_config(self.plan_catalog_json.as_deref())
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".into(),
            data_dir: "/data/aiorreal-quota".into(),
            webhook_secret: None,
            plan_catalog_json: None,
            cors_origins: vec!["*".into()],
            max_body_bytes: 1024 * 1024,
            request_timeout_seconds: 30,
        }
    }
}
