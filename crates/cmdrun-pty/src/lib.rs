//! Pseudo-terminal process adapter.
//!
//! Spawns a command under a pseudo-terminal and hands back a [`PtyProcess`]:
//! an output source, an input sink, a one-shot exit signal, and a killer.
//! The same handle is produced on every platform; which OS facility backs
//! it is decided in [`native`].

pub mod decoder;
pub mod error;
pub mod native;
pub mod process;
pub mod shell;

#[cfg(any(test, feature = "test-util"))]
pub mod scripted;

pub use decoder::Utf8Decoder;
pub use error::PtyError;
pub use native::NativePtySpawner;
pub use process::{
    ExitNotifier, ExitSignal, ProcessKiller, PtyProcess, PtySink, PtySource, PtySpawner,
    SpawnRequest,
};
pub use shell::default_shell;
