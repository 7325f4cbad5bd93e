//! Application configuration schemas.
//!
//! All configuration structs are deserialized from TOML files via the
//! `config` crate. Each sub-module represents a logical configuration
//! section.

pub mod app;
pub mod logging;
pub mod retention;
pub mod storage;
pub mod tools;
pub mod worker;

use serde::{Deserialize, Serialize};

use self::app::ServerConfig;
use self::logging::LoggingConfig;
use self::retention::RetentionConfig;
use self::storage::StorageConfig;
use self::tools::ToolsConfig;
use self::worker::WorkerConfig;

use crate::error::AppError;

/// Root application configuration.
///
/// This struct is the top-level deserialization target for the merged
/// TOML configuration files (default.toml + environment overlay).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,
    /// Storage area settings.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Job worker pool settings.
    #[serde(default)]
    pub worker: WorkerConfig,
    /// Artifact retention settings.
    #[serde(default)]
    pub retention: RetentionConfig,
    /// External conversion tool settings.
    #[serde(default)]
    pub tools: ToolsConfig,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from TOML files.
    ///
    /// Merges the default configuration with an environment-specific overlay
    /// and environment variables prefixed with `PAPERMILL_`.
    pub fn load(env: &str) -> Result<Self, AppError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false))
            .add_source(
                config::Environment::with_prefix("PAPERMILL")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| AppError::configuration(format!("Failed to build config: {e}")))?;

        config
            .try_deserialize()
            .map_err(|e| AppError::configuration(format!("Failed to deserialize config: {e}")))
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
            worker: WorkerConfig::default(),
            retention: RetentionConfig::default(),
            tools: ToolsConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_values() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.max_upload_mb, 500);
        assert_eq!(config.worker.max_concurrent_jobs, 4);
        assert_eq!(config.retention.sweep_interval_secs, 300);
        assert_eq!(config.retention.max_age_secs, 900);
        assert_eq!(config.retention.delete_retries, 3);
        assert_eq!(config.retention.delete_retry_delay_secs, 2);
    }

    #[test]
    fn test_empty_toml_deserializes_to_defaults() {
        let parsed: AppConfig = toml_from_str("");
        assert_eq!(parsed.storage.data_dir, "./data");
        assert_eq!(parsed.tools.timeout_secs, 300);
        assert_eq!(parsed.logging.level, "info");
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        let parsed: AppConfig = toml_from_str("[retention]\nmax_age_secs = 60\n");
        assert_eq!(parsed.retention.max_age_secs, 60);
        assert_eq!(parsed.retention.sweep_interval_secs, 300);
    }

    fn toml_from_str(raw: &str) -> AppConfig {
        config::Config::builder()
            .add_source(config::File::from_str(raw, config::FileFormat::Toml))
            .build()
            .expect("build")
            .try_deserialize()
            .expect("deserialize")
    }
}
