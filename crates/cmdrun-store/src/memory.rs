//! In-memory implementation of both store traits.

use std::collections::BTreeMap;

use async_trait::async_trait;
use cmdrun_common::{
    validate_file_name, CommandDefinition, CommandId, EmbeddedFile, FileId, StoreError,
};
use tokio::sync::RwLock;

use crate::{BlobStore, CommandStore};

#[derive(Default)]
struct Inner {
    commands: BTreeMap<CommandId, CommandDefinition>,
    files: BTreeMap<FileId, StoredFile>,
}

struct StoredFile {
    meta: EmbeddedFile,
    content: Option<Vec<u8>>,
}

/// Commands keyed by id, embedded files keyed by a globally unique file id.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a command. A blank display name becomes
    /// `"Command <id>"`.
    pub async fn insert_command(&self, mut command: CommandDefinition) {
        if command.name.trim().is_empty() {
            command.name = format!("Command {}", command.id);
        }
        self.inner.write().await.commands.insert(command.id, command);
    }

    /// Attach a file with its content.
    pub async fn attach_file(
        &self,
        file: EmbeddedFile,
        content: impl Into<Vec<u8>>,
    ) -> Result<(), StoreError> {
        self.insert_file(file, Some(content.into())).await
    }

    /// Attach file metadata only; content is served by another blob store.
    pub async fn attach_file_metadata(&self, file: EmbeddedFile) -> Result<(), StoreError> {
        self.insert_file(file, None).await
    }

    async fn insert_file(
        &self,
        file: EmbeddedFile,
        content: Option<Vec<u8>>,
    ) -> Result<(), StoreError> {
        validate_file_name(&file.name)?;

        let mut inner = self.inner.write().await;
        if !inner.commands.contains_key(&file.command_id) {
            return Err(StoreError::NotFound(format!("command {}", file.command_id)));
        }
        if inner.files.contains_key(&file.id) {
            return Err(StoreError::Duplicate(format!("file {}", file.id)));
        }
        inner.files.insert(
            file.id,
            StoredFile {
                meta: file,
                content,
            },
        );
        Ok(())
    }

    pub async fn command_count(&self) -> usize {
        self.inner.read().await.commands.len()
    }
}

#[async_trait]
impl CommandStore for MemoryStore {
    async fn command(&self, id: CommandId) -> Result<CommandDefinition, StoreError> {
        self.inner
            .read()
            .await
            .commands
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("command {id}")))
    }

    async fn command_files(&self, id: CommandId) -> Result<Vec<EmbeddedFile>, StoreError> {
        let inner = self.inner.read().await;
        if !inner.commands.contains_key(&id) {
            return Err(StoreError::NotFound(format!("command {id}")));
        }
        Ok(inner
            .files
            .values()
            .filter(|f| f.meta.command_id == id)
            .map(|f| f.meta.clone())
            .collect())
    }
}

#[async_trait]
impl BlobStore for MemoryStore {
    async fn file_content(&self, id: FileId) -> Result<Vec<u8>, StoreError> {
        self.inner
            .read()
            .await
            .files
            .get(&id)
            .and_then(|f| f.content.clone())
            .ok_or_else(|| StoreError::NotFound(format!("file {id}")))
    }
}
