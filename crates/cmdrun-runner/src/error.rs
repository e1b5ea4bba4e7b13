use std::path::PathBuf;

use cmdrun_common::{CommandId, StoreError};
use cmdrun_pty::PtyError;

/// Why a file could not be staged.
#[derive(Debug, thiserror::Error)]
pub enum StagingError {
    #[error("failed to fetch content of {name:?}: {source}")]
    Fetch {
        name: String,
        #[source]
        source: StoreError,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("refusing to stage file with invalid name {0:?}")]
    InvalidName(String),
}

/// Failures on the session start path. Nothing is left running or staged
/// when one of these is returned.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error("command {0} not found")]
    NotFound(CommandId),

    #[error("command {0} has no command text")]
    EmptyCommand(CommandId),

    #[error("working directory {0} does not exist")]
    MissingWorkDir(PathBuf),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Staging(#[from] StagingError),

    #[error("spawn failed: {0}")]
    Spawn(#[from] PtyError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runner_error_display() {
        assert_eq!(
            RunnerError::NotFound(CommandId(4)).to_string(),
            "command 4 not found"
        );
        assert_eq!(
            RunnerError::EmptyCommand(CommandId(4)).to_string(),
            "command 4 has no command text"
        );
        let err: RunnerError = StagingError::InvalidName("../x".into()).into();
        assert_eq!(
            err.to_string(),
            "refusing to stage file with invalid name \"../x\""
        );
    }
}
