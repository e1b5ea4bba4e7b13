//! Configuration validation.
//!
//! Checks every section and collects all problems into a single
//! `ConfigError`.

use crate::schema::CmdrunConfig;
use cmdrun_common::ConfigError;

const MAX_FLUSH_INTERVAL_MS: u64 = 10_000;

/// Run all validations on a config, collecting all errors.
pub fn validate(config: &CmdrunConfig) -> Result<(), ConfigError> {
    let mut errors: Vec<String> = Vec::new();

    validate_server(&mut errors, config);
    validate_runner(&mut errors, config);
    validate_storage(&mut errors, config);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationError(errors.join("; ")))
    }
}

fn validate_server(errors: &mut Vec<String>, config: &CmdrunConfig) {
    let server = &config.server;
    if server.bind.trim().is_empty() {
        errors.push("server.bind must not be empty".into());
    }
    if !(1..=MAX_FLUSH_INTERVAL_MS).contains(&server.flush_interval_ms) {
        errors.push(format!(
            "server.flush_interval_ms must be between 1 and {MAX_FLUSH_INTERVAL_MS}, got {}",
            server.flush_interval_ms
        ));
    }
    if server.handshake_timeout_secs == 0 {
        errors.push("server.handshake_timeout_secs must be positive".into());
    }
    if !server.path_prefix.starts_with('/') || server.path_prefix.trim_end_matches('/').is_empty()
    {
        errors.push(format!(
            "server.path_prefix must be an absolute route like /api/v1/ws/commands, got {:?}",
            server.path_prefix
        ));
    }
}

fn validate_runner(errors: &mut Vec<String>, config: &CmdrunConfig) {
    if config.runner.input_queue_capacity == 0 {
        errors.push("runner.input_queue_capacity must be positive".into());
    }
    if config.runner.output_queue_capacity == 0 {
        errors.push("runner.output_queue_capacity must be positive".into());
    }
    for key in config.runner.env.keys() {
        if key.is_empty() || key.contains('=') || key.contains('\0') {
            errors.push(format!("runner.env has invalid variable name {key:?}"));
        }
    }
}

fn validate_storage(errors: &mut Vec<String>, config: &CmdrunConfig) {
    if config.storage.catalog.trim().is_empty() {
        errors.push("storage.catalog must not be empty".into());
    }
}
