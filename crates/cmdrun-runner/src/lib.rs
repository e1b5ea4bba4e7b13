//! Session runner: resolves a command, stages its files, spawns it under a
//! PTY, and relays input and output through a pair of queues until the
//! process ends or the session is cancelled.

pub mod error;
pub mod runner;
pub mod staging;

pub use error::{RunnerError, StagingError};
pub use runner::{RunnerConfig, Session, SessionRunner};
pub use staging::{stage_files, CleanupStack};
