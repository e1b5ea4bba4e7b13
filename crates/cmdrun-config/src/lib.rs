//! cmdrun configuration system.
//!
//! TOML-based configuration for the command server. Every section uses
//! serde defaults, so a partial file (or no file at all) yields a working
//! setup. Environment overrides and validation run after parsing.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use cmdrun_config::load_config;
//!
//! let config = load_config(None).expect("failed to load config");
//! println!("listening on {}", config.server.listen_addr());
//! ```

pub mod env;
pub mod schema;
pub mod toml_loader;
pub mod validation;

pub use env::apply_env_overrides;
pub use schema::{CmdrunConfig, LoggingConfig, RunConfig, ServerConfig, StorageConfig};

use cmdrun_common::ConfigError;
use std::path::Path;

/// Load, override, and validate the configuration.
///
/// With `path` set the file must exist. Without it the platform default
/// path is used and created with defaults on first run. `PORT` and
/// `CONSOLE` from the process environment are applied last.
pub fn load_config(path: Option<&Path>) -> Result<CmdrunConfig, ConfigError> {
    let mut config = match path {
        Some(path) => toml_loader::load_from_path(path)?,
        None => toml_loader::load_default()?,
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    validation::validate(&config)?;
    Ok(config)
}
