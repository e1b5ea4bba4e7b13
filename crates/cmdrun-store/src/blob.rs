//! File content stored on disk as `<data_dir>/files/<file_id>`.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use cmdrun_common::{FileId, StoreError};

use crate::BlobStore;

/// Subdirectory of the data directory holding file content.
pub const FILES_DIR: &str = "files";

#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    /// Serve blobs from `<data_dir>/files`.
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            root: data_dir.as_ref().join(FILES_DIR),
        }
    }

    pub fn path_for(&self, id: FileId) -> PathBuf {
        self.root.join(id.to_string())
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn file_content(&self, id: FileId) -> Result<Vec<u8>, StoreError> {
        match tokio::fs::read(self.path_for(id)).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(format!("file {id}")))
            }
            Err(e) => Err(StoreError::Io(e)),
        }
    }
}
