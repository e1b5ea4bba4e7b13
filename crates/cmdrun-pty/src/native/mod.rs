//! OS-backed spawner.
//!
//! Opens a pseudo-terminal with `portable-pty`, starts the command through
//! the platform shell, and wires two dedicated threads to it: one pumps
//! terminal output into a channel, the other polls the child until it is
//! reaped and fires the exit signal. Command construction is the only part that differs per
//! platform and lives in the `unix` / `windows` submodules.

use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use portable_pty::{native_pty_system, Child, ChildKiller, MasterPty, PtySize};
use tokio::sync::mpsc;

use crate::error::PtyError;
use crate::process::{
    ExitNotifier, ExitSignal, ProcessKiller, PtyProcess, PtySink, PtySource, PtySpawner,
    SpawnRequest,
};
use crate::shell::default_shell;

#[cfg(unix)]
mod unix;
#[cfg(unix)]
use unix as platform;

#[cfg(windows)]
mod windows;
#[cfg(windows)]
use windows as platform;

/// Bytes requested per read from the PTY master.
pub const PTY_READ_CHUNK: usize = 8192;

/// Chunks buffered between the reader thread and the session.
const SOURCE_CHANNEL_CAPACITY: usize = 64;

/// How often the waiter polls the child for an exit status.
const REAP_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Spawns commands under a real pseudo-terminal.
#[derive(Debug, Clone)]
pub struct NativePtySpawner {
    shell: String,
}

impl NativePtySpawner {
    /// `shell` overrides the platform default (`sh` / `cmd`).
    pub fn new(shell: Option<&str>) -> Self {
        let shell = match shell {
            Some(s) if !s.trim().is_empty() => s.to_string(),
            _ => default_shell(),
        };
        Self { shell }
    }

    pub fn shell(&self) -> &str {
        &self.shell
    }
}

impl Default for NativePtySpawner {
    fn default() -> Self {
        Self::new(None)
    }
}

impl PtySpawner for NativePtySpawner {
    fn spawn(&self, request: &SpawnRequest) -> Result<PtyProcess, PtyError> {
        let pty_system = native_pty_system();

        let size = PtySize {
            rows: request.rows,
            cols: request.cols,
            pixel_width: 0,
            pixel_height: 0,
        };

        let pair = pty_system
            .openpty(size)
            .map_err(|e| PtyError::OpenFailed(e.to_string()))?;

        let cmd = platform::build_command(&self.shell, request);

        let mut child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| PtyError::SpawnFailed(format!("{}: {e}", self.shell)))?;

        // Only the master side is needed from here on.
        drop(pair.slave);

        let pid = child.process_id();
        tracing::debug!(
            pid = ?pid,
            shell = %self.shell,
            workdir = %request.workdir.display(),
            rows = request.rows,
            cols = request.cols,
            "pty child spawned"
        );

        let io = pair
            .master
            .take_writer()
            .and_then(|writer| Ok((writer, pair.master.try_clone_reader()?)));
        let (writer, reader) = match io {
            Ok(io) => io,
            Err(e) => {
                let _ = child.kill();
                return Err(PtyError::SpawnFailed(format!("pty handles: {e}")));
            }
        };

        let exited = Arc::new(AtomicBool::new(false));
        let child = SharedChild {
            child: Arc::new(Mutex::new(child)),
            exited: exited.clone(),
        };
        let killer = ProcessKiller::new(Box::new(child.clone()), exited.clone());

        let (chunk_tx, chunk_rx) = mpsc::channel(SOURCE_CHANNEL_CAPACITY);
        if let Err(e) = spawn_reader(reader, chunk_tx) {
            let _ = killer.kill();
            return Err(PtyError::SpawnFailed(format!("reader thread: {e}")));
        }

        let (notifier, exit) = ExitSignal::channel();
        if let Err(e) = spawn_waiter(child, pair.master, notifier) {
            let _ = killer.kill();
            return Err(PtyError::SpawnFailed(format!("waiter thread: {e}")));
        }

        Ok(PtyProcess::new(
            PtySource::new(chunk_rx),
            PtySink::new(writer),
            exit,
            killer,
        ))
    }
}

/// Pump terminal output into `tx` until EOF, a read error, or the
/// receiver going away.
fn spawn_reader(
    mut reader: Box<dyn Read + Send>,
    tx: mpsc::Sender<Vec<u8>>,
) -> std::io::Result<()> {
    thread::Builder::new()
        .name("pty-reader".to_string())
        .spawn(move || {
            let mut buf = [0u8; PTY_READ_CHUNK];
            loop {
                match reader.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        if tx.blocking_send(buf[..n].to_vec()).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        // EIO once the child side closes on Linux.
                        tracing::debug!("pty reader stopped: {e}");
                        break;
                    }
                }
            }
        })
        .map(|_| ())
}

/// The child, shared between the waiter thread and every kill handle.
///
/// Killing goes through `Child::kill`, which follows the hangup with
/// SIGKILL when the process ignores it. The signaller returned by
/// `clone_killer` only ever sends the hangup.
#[derive(Debug, Clone)]
struct SharedChild {
    child: Arc<Mutex<Box<dyn Child + Send + Sync>>>,
    exited: Arc<AtomicBool>,
}

impl SharedChild {
    /// Non-blocking reap. Marks the child exited while the lock is held, so
    /// no kill can slip in between reaping and the flag being set.
    fn try_reap(&self) -> Option<Result<(), PtyError>> {
        let mut child = match self.child.lock() {
            Ok(child) => child,
            Err(_) => {
                self.exited.store(true, Ordering::SeqCst);
                return Some(Err(PtyError::WaitFailed("child lock poisoned".into())));
            }
        };
        let outcome = match child.try_wait() {
            Ok(None) => return None,
            Ok(Some(status)) if status.success() => Ok(()),
            Ok(Some(status)) => Err(PtyError::ExitStatus(status.exit_code())),
            Err(e) => Err(PtyError::WaitFailed(e.to_string())),
        };
        self.exited.store(true, Ordering::SeqCst);
        Some(outcome)
    }
}

impl ChildKiller for SharedChild {
    fn kill(&mut self) -> std::io::Result<()> {
        let mut child = self
            .child
            .lock()
            .map_err(|_| std::io::Error::other("child lock poisoned"))?;
        if self.exited.load(Ordering::SeqCst) {
            return Ok(());
        }
        child.kill()
    }

    fn clone_killer(&self) -> Box<dyn ChildKiller + Send + Sync> {
        Box::new(self.clone())
    }
}

/// Poll the child until it is reaped and report how it ended. The lock is
/// only held per poll so kills never wait behind a blocking `wait`.
fn spawn_waiter(
    child: SharedChild,
    master: Box<dyn MasterPty + Send>,
    notifier: ExitNotifier,
) -> std::io::Result<()> {
    thread::Builder::new()
        .name("pty-waiter".to_string())
        .spawn(move || {
            let outcome = loop {
                match child.try_reap() {
                    Some(outcome) => break outcome,
                    None => thread::sleep(REAP_POLL_INTERVAL),
                }
            };
            tracing::debug!(outcome = ?outcome, "pty child exited");

            // ConPTY keeps the reader blocked until the master is closed.
            drop(master);
            notifier.notify(outcome);
        })
        .map(|_| ())
}
