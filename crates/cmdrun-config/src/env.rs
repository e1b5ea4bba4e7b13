//! Environment variable overrides.

use crate::schema::CmdrunConfig;
use tracing::warn;

/// Apply `PORT` and `CONSOLE` overrides using `lookup` to read variables.
///
/// An unparsable `PORT` is ignored with a warning.
pub fn apply_env_overrides<F>(config: &mut CmdrunConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(port) = lookup("PORT") {
        match port.trim().parse::<u16>() {
            Ok(port) => config.server.port = port,
            Err(e) => warn!(value = %port, error = %e, "ignoring invalid PORT"),
        }
    }

    if let Some(console) = lookup("CONSOLE") {
        if !console.trim().is_empty() {
            config.runner.shell = console;
        }
    }
}
