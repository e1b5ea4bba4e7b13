use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Where command definitions and embedded file contents live.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Data directory. Blobs are read from `<data_dir>/files/<file_id>`.
    pub data_dir: PathBuf,
    /// Catalog file name, relative to `data_dir`.
    pub catalog: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            catalog: "commands.json".into(),
        }
    }
}

impl StorageConfig {
    pub fn catalog_path(&self) -> PathBuf {
        self.data_dir.join(&self.catalog)
    }
}
