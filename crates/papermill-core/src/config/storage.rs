//! Storage area configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Storage area configuration.
///
/// The three lifecycle areas (intake, output, scratch) live as fixed
/// subdirectories of `data_dir`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root directory holding the storage areas.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

impl StorageConfig {
    /// Root directory as a path.
    pub fn root(&self) -> PathBuf {
        PathBuf::from(&self.data_dir)
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

fn default_data_dir() -> String {
    "./data".to_string()
}
