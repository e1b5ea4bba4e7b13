//! Command definitions and embedded-file content.
//!
//! The runner only sees the two traits below. `MemoryStore` backs both for
//! tests and for the catalog loaded at startup; `FsBlobStore` serves file
//! content from the data directory.

pub mod blob;
pub mod catalog;
pub mod memory;

use async_trait::async_trait;
use cmdrun_common::{CommandDefinition, CommandId, EmbeddedFile, FileId, StoreError};

pub use blob::FsBlobStore;
pub use catalog::{load_catalog, Catalog, CatalogCommand, CatalogFile};
pub use memory::MemoryStore;

/// Lookup of command definitions and their embedded-file metadata.
#[async_trait]
pub trait CommandStore: Send + Sync {
    /// The command with `id`, or `StoreError::NotFound`.
    async fn command(&self, id: CommandId) -> Result<CommandDefinition, StoreError>;

    /// Files staged for command `id`. Empty when it has none.
    async fn command_files(&self, id: CommandId) -> Result<Vec<EmbeddedFile>, StoreError>;
}

/// Content of embedded files, addressed by file id.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn file_content(&self, id: FileId) -> Result<Vec<u8>, StoreError>;
}
