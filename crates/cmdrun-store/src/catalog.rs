//! Read-only JSON catalog of commands and their embedded-file metadata.
//!
//! ```json
//! {"commands": [{"id": 1, "name": "Echo", "command": "echo hello", "dir": "/tmp",
//!                "files": [{"id": 7, "name": "greeting.txt"}]}]}
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use cmdrun_common::{CommandDefinition, CommandId, EmbeddedFile, FileId, StoreError};
use serde::{Deserialize, Serialize};

use crate::MemoryStore;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub commands: Vec<CatalogCommand>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogCommand {
    pub id: CommandId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
    #[serde(default)]
    pub files: Vec<CatalogFile>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogFile {
    pub id: FileId,
    pub name: String,
}

impl Catalog {
    pub fn parse(json: &str) -> Result<Self, StoreError> {
        serde_json::from_str(json).map_err(|e| StoreError::Parse(e.to_string()))
    }

    /// Build a store holding every command and its file metadata.
    pub async fn into_store(self) -> Result<MemoryStore, StoreError> {
        let store = MemoryStore::new();
        let mut seen = HashSet::new();

        for entry in self.commands {
            if !seen.insert(entry.id) {
                return Err(StoreError::Duplicate(format!("command {}", entry.id)));
            }

            let mut definition = CommandDefinition::new(entry.id, entry.name, entry.command);
            definition.dir = entry.dir;
            store.insert_command(definition).await;

            for file in entry.files {
                store
                    .attach_file_metadata(EmbeddedFile {
                        id: file.id,
                        command_id: entry.id,
                        name: file.name,
                    })
                    .await?;
            }
        }

        Ok(store)
    }
}

/// Load the catalog at `path`. A missing file yields an empty store.
pub async fn load_catalog(path: &Path) -> Result<MemoryStore, StoreError> {
    let json = match tokio::fs::read_to_string(path).await {
        Ok(json) => json,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!(path = %path.display(), "command catalog not found, starting empty");
            return Ok(MemoryStore::new());
        }
        Err(e) => return Err(StoreError::Io(e)),
    };

    let store = Catalog::parse(&json)?.into_store().await?;
    tracing::info!(
        path = %path.display(),
        commands = store.command_count().await,
        "command catalog loaded"
    );
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CommandStore;

    const SAMPLE: &str = r#"{
        "commands": [
            {"id": 1, "name": "Echo", "command": "echo hello", "dir": "/tmp",
             "files": [{"id": 7, "name": "greeting.txt"}]},
            {"id": 2, "command": "ls"}
        ]
    }"#;

    #[tokio::test]
    async fn loads_commands_and_files() {
        let store = Catalog::parse(SAMPLE).unwrap().into_store().await.unwrap();

        let echo = store.command(CommandId(1)).await.unwrap();
        assert_eq!(echo.name, "Echo");
        assert_eq!(echo.dir, Some(PathBuf::from("/tmp")));

        let files = store.command_files(CommandId(1)).await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].id, FileId(7));
        assert_eq!(files[0].name, "greeting.txt");

        let ls = store.command(CommandId(2)).await.unwrap();
        assert_eq!(ls.name, "Command 2");
        assert!(ls.dir.is_none());
    }

    #[tokio::test]
    async fn duplicate_command_ids_are_rejected() {
        let json = r#"{"commands": [{"id": 1, "command": "a"}, {"id": 1, "command": "b"}]}"#;
        let err = Catalog::parse(json).unwrap().into_store().await.err();
        assert!(matches!(err, Some(StoreError::Duplicate(_))));
    }

    #[tokio::test]
    async fn invalid_file_name_is_rejected() {
        let json = r#"{"commands": [{"id": 1, "command": "a", "files": [{"id": 1, "name": "a/b"}]}]}"#;
        let err = Catalog::parse(json).unwrap().into_store().await.err();
        assert!(matches!(err, Some(StoreError::InvalidName(_))));
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        assert!(matches!(
            Catalog::parse("{not json"),
            Err(StoreError::Parse(_))
        ));
    }

    #[tokio::test]
    async fn missing_catalog_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = load_catalog(&dir.path().join("commands.json")).await.unwrap();
        assert_eq!(store.command_count().await, 0);
    }

    #[tokio::test]
    async fn catalog_file_on_disk_loads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("commands.json");
        std::fs::write(&path, SAMPLE).unwrap();
        let store = load_catalog(&path).await.unwrap();
        assert_eq!(store.command_count().await, 2);
    }
}
