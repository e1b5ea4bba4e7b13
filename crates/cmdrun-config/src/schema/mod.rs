//! Configuration schema types for cmdrun.
//!
//! All structs use `serde(default)` so partial configs work correctly.

mod logging;
mod run;
mod server;
mod storage;

pub use logging::*;
pub use run::*;
pub use server::*;
pub use storage::*;

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CmdrunConfig {
    pub server: ServerConfig,
    pub runner: RunConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}
