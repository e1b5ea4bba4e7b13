pub mod errors;
pub mod id;
pub mod names;
pub mod types;

pub use errors::{CmdrunError, ConfigError, StoreError};
pub use id::{CommandId, ConnectionId, FileId};
pub use names::validate_file_name;
pub use types::{CommandDefinition, EmbeddedFile, TerminalOptions, DEFAULT_COLS, DEFAULT_ROWS};

pub type Result<T> = std::result::Result<T, CmdrunError>;
