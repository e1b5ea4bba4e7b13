//! Command execution settings.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// How commands are executed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Shell used to interpret command text. Empty means `sh` on Unix and
    /// `cmd` on Windows.
    pub shell: String,
    /// Working directory for commands without their own. Empty means the
    /// user's home directory.
    pub default_dir: String,
    /// Capacity of the per-session input queue (chunks).
    pub input_queue_capacity: usize,
    /// Capacity of the per-session output queue (characters).
    pub output_queue_capacity: usize,
    /// Extra environment variables for every command.
    pub env: BTreeMap<String, String>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            shell: String::new(),
            default_dir: String::new(),
            input_queue_capacity: 64,
            output_queue_capacity: 4096,
            env: BTreeMap::new(),
        }
    }
}

impl RunConfig {
    /// The directory commands fall back to.
    ///
    /// Resolution order: `default_dir`, the home directory, the current
    /// directory, and finally `.`.
    pub fn resolved_default_dir(&self) -> PathBuf {
        if !self.default_dir.is_empty() {
            return PathBuf::from(&self.default_dir);
        }
        dirs::home_dir()
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Configured shell, if any.
    pub fn shell_override(&self) -> Option<&str> {
        if self.shell.trim().is_empty() {
            None
        } else {
            Some(self.shell.trim())
        }
    }
}
