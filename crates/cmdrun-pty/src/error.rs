//! PTY error types.

/// Errors originating from PTY operations.
#[derive(Debug, thiserror::Error)]
pub enum PtyError {
    #[error("failed to open pseudo-terminal: {0}")]
    OpenFailed(String),

    #[error("failed to spawn process: {0}")]
    SpawnFailed(String),

    #[error("process exited with status {0}")]
    ExitStatus(u32),

    #[error("failed to wait for process: {0}")]
    WaitFailed(String),

    #[error("terminal input is closed")]
    SinkClosed,

    #[error(transparent)]
    IoError(#[from] std::io::Error),
}
