//! Network-facing settings.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// WebSocket server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind.
    pub bind: String,
    /// TCP port.
    pub port: u16,
    /// Route prefix; sessions connect to `<prefix>/<command_id>`.
    pub path_prefix: String,
    /// Period of the output flush timer, in milliseconds.
    pub flush_interval_ms: u64,
    /// How long a fresh connection may take to send its options message.
    pub handshake_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".into(),
            port: 8080,
            path_prefix: "/api/v1/ws/commands".into(),
            flush_interval_ms: 50,
            handshake_timeout_secs: 10,
        }
    }
}

impl ServerConfig {
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }
}
