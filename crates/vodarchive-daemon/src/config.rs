//! Daemon configuration, loaded from the environment (`.env` via `dotenvy`, or real
//! environment variables). Mirrors `WorkerConfig::from_env` in shape: every field has a
//! hardcoded default so the daemon runs out of the box in a dev checkout.

use std::time::Duration;

/// Top-level daemon configuration.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    /// `sqlx` connection string for the Job Store, e.g. `sqlite://vodarchive.db`.
    pub database_url: String,
    /// Root of the filesystem layout (§6): `vods/`, `chats/`, `finals/` live under here.
    pub base_dir: String,
    /// OAuth bearer token for the upload API. Required before any `Uploading` stage can
    /// run; its absence is a permanent failure (`WorkerError::MissingInput`), not a
    /// startup error, so the rest of the pipeline still functions without it.
    pub upload_oauth_token: String,
    /// Identifier this process records as `LeasedBy` while driving a job.
    pub dispatcher_holder: String,
    /// How often the Ingestor polls its source for new VODs.
    pub ingest_interval: Duration,
    /// Emit JSON logs instead of ANSI-colored text (production vs. dev).
    pub log_json: bool,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://vodarchive.db".to_string(),
            base_dir: "./data".to_string(),
            upload_oauth_token: String::new(),
            dispatcher_holder: "vodarchive-dispatcher".to_string(),
            ingest_interval: Duration::from_secs(300),
            log_json: false,
        }
    }
}

impl DaemonConfig {
    /// Load configuration from the environment, falling back to [`DaemonConfig::default`]
    /// field-by-field when a variable is absent or fails to parse.
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            database_url: std::env::var("VODARCHIVE_DATABASE_URL").unwrap_or(default.database_url),
            base_dir: std::env::var("VODARCHIVE_BASE_DIR").unwrap_or(default.base_dir),
            upload_oauth_token: std::env::var("VODARCHIVE_UPLOAD_OAUTH_TOKEN").unwrap_or_default(),
            dispatcher_holder: std::env::var("VODARCHIVE_HOLDER_ID").unwrap_or(default.dispatcher_holder),
            ingest_interval: Duration::from_secs(
                std::env::var("VODARCHIVE_INGEST_INTERVAL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(300),
            ),
            log_json: std::env::var("LOG_FORMAT")
                .map(|v| v.eq_ignore_ascii_case("json"))
                .unwrap_or(false),
        }
    }
}
