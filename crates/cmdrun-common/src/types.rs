use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::id::{CommandId, FileId};

/// Terminal rows used when a client asks for zero.
pub const DEFAULT_ROWS: u16 = 24;

/// Terminal columns used when a client asks for zero.
pub const DEFAULT_COLS: u16 = 80;

/// A runnable command as stored in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandDefinition {
    pub id: CommandId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub command: String,
    /// Working directory override. `None` means the configured default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
}

impl CommandDefinition {
    pub fn new(id: CommandId, name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            command: command.into(),
            dir: None,
        }
    }

    pub fn with_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = Some(dir.into());
        self
    }

    /// True when there is nothing to execute.
    pub fn is_blank(&self) -> bool {
        self.command.trim().is_empty()
    }
}

/// A file staged into the working directory before its command runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddedFile {
    pub id: FileId,
    pub command_id: CommandId,
    pub name: String,
}

/// Terminal parameters requested by the client for one session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalOptions {
    #[serde(default)]
    pub cols: u16,
    #[serde(default)]
    pub rows: u16,
    /// Extra environment for the child. Never read from the wire.
    #[serde(skip)]
    pub env: Vec<(String, String)>,
}

impl TerminalOptions {
    pub fn new(rows: u16, cols: u16) -> Self {
        Self {
            cols,
            rows,
            env: Vec::new(),
        }
    }

    /// `(rows, cols)` with zero dimensions replaced by the defaults.
    pub fn geometry(&self) -> (u16, u16) {
        let rows = if self.rows == 0 { DEFAULT_ROWS } else { self.rows };
        let cols = if self.cols == 0 { DEFAULT_COLS } else { self.cols };
        (rows, cols)
    }
}
