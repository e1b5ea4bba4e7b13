//! The platform-independent process handle.
//!
//! A [`PtyProcess`] is four capabilities and nothing else: an output
//! source, an input sink, a one-shot exit signal, and a killer. Platform
//! types never appear here.

use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use portable_pty::ChildKiller;
use tokio::sync::{mpsc, oneshot};

use crate::error::PtyError;

// =============================================================================
// SPAWNING
// =============================================================================

/// Everything needed to start one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnRequest {
    /// Command text handed to the shell.
    pub command: String,
    /// Working directory of the child.
    pub workdir: PathBuf,
    /// Environment set on top of the inherited one, applied in order.
    pub env: Vec<(String, String)>,
    pub rows: u16,
    pub cols: u16,
}

/// Starts commands under a pseudo-terminal.
///
/// Failures to start (missing executable, no PTY device) are returned
/// here. Anything that goes wrong later is reported through the
/// [`ExitSignal`].
pub trait PtySpawner: Send + Sync {
    fn spawn(&self, request: &SpawnRequest) -> Result<PtyProcess, PtyError>;
}

// =============================================================================
// HANDLE
// =============================================================================

/// A running command attached to a pseudo-terminal.
pub struct PtyProcess {
    source: PtySource,
    sink: PtySink,
    exit: ExitSignal,
    killer: ProcessKiller,
}

impl PtyProcess {
    pub fn new(source: PtySource, sink: PtySink, exit: ExitSignal, killer: ProcessKiller) -> Self {
        Self {
            source,
            sink,
            exit,
            killer,
        }
    }

    /// Split the handle so each capability can move to its own task.
    pub fn into_parts(self) -> (PtySource, PtySink, ExitSignal, ProcessKiller) {
        (self.source, self.sink, self.exit, self.killer)
    }
}

// =============================================================================
// OUTPUT
// =============================================================================

/// Combined stdout/stderr of the terminal, as raw byte chunks.
pub struct PtySource {
    rx: mpsc::Receiver<Vec<u8>>,
}

impl PtySource {
    pub fn new(rx: mpsc::Receiver<Vec<u8>>) -> Self {
        Self { rx }
    }

    /// Next chunk, or `None` once the terminal has no more output.
    pub async fn recv(&mut self) -> Option<Vec<u8>> {
        self.rx.recv().await
    }
}

// =============================================================================
// INPUT
// =============================================================================

/// Terminal input. Writes are blocking on the OS side, so each one runs on
/// the blocking pool.
pub struct PtySink {
    writer: Option<Box<dyn Write + Send>>,
}

impl PtySink {
    pub fn new(writer: Box<dyn Write + Send>) -> Self {
        Self {
            writer: Some(writer),
        }
    }

    /// Write `data` and flush it through to the terminal.
    pub async fn write_all(&mut self, data: Vec<u8>) -> Result<(), PtyError> {
        let mut writer = self.writer.take().ok_or(PtyError::SinkClosed)?;

        let (writer, result) = tokio::task::spawn_blocking(move || {
            let result = writer.write_all(&data).and_then(|()| writer.flush());
            (writer, result)
        })
        .await
        .map_err(|e| PtyError::IoError(std::io::Error::other(e)))?;

        self.writer = Some(writer);
        result.map_err(PtyError::from)
    }

    /// Drop the writer; later writes fail with [`PtyError::SinkClosed`].
    pub fn close(&mut self) {
        self.writer = None;
    }
}

// =============================================================================
// EXIT
// =============================================================================

/// Resolves once, when the child terminates. `Ok(())` is a clean exit.
pub struct ExitSignal {
    rx: oneshot::Receiver<Result<(), PtyError>>,
}

/// Sending half of an [`ExitSignal`].
pub struct ExitNotifier {
    tx: oneshot::Sender<Result<(), PtyError>>,
}

impl ExitSignal {
    pub fn channel() -> (ExitNotifier, ExitSignal) {
        let (tx, rx) = oneshot::channel();
        (ExitNotifier { tx }, ExitSignal { rx })
    }

    /// Wait for termination. Consumes the signal, so it is observed once.
    pub async fn wait(self) -> Result<(), PtyError> {
        match self.rx.await {
            Ok(outcome) => outcome,
            Err(_) => Err(PtyError::WaitFailed("exit watcher stopped".into())),
        }
    }
}

impl ExitNotifier {
    pub fn notify(self, outcome: Result<(), PtyError>) {
        // Nobody listening is fine: the session may already be gone.
        let _ = self.tx.send(outcome);
    }
}

// =============================================================================
// KILL
// =============================================================================

/// Forcibly terminates the child. Cheap to clone; every clone targets the
/// same process.
///
/// The wrapped [`ChildKiller`] must not return until the child is dead or
/// about to die; a polite signal the child can ignore is not enough.
#[derive(Clone)]
pub struct ProcessKiller {
    killer: Arc<Mutex<Box<dyn ChildKiller + Send + Sync>>>,
    exited: Arc<AtomicBool>,
}

impl ProcessKiller {
    /// `exited` must be set by whoever reaps the child; once it is set,
    /// [`ProcessKiller::kill`] stops signalling so a recycled pid is never hit.
    pub fn new(killer: Box<dyn ChildKiller + Send + Sync>, exited: Arc<AtomicBool>) -> Self {
        Self {
            killer: Arc::new(Mutex::new(killer)),
            exited,
        }
    }

    pub fn has_exited(&self) -> bool {
        self.exited.load(Ordering::SeqCst)
    }

    /// Kill the child. A no-op after it has exited; safe to repeat.
    pub fn kill(&self) -> Result<(), PtyError> {
        if self.has_exited() {
            return Ok(());
        }
        let mut killer = self
            .killer
            .lock()
            .map_err(|_| PtyError::WaitFailed("killer lock poisoned".into()))?;
        if self.has_exited() {
            return Ok(());
        }
        killer.kill().map_err(PtyError::from)
    }
}

// =============================================================================
// TESTS
// =============================================================================
