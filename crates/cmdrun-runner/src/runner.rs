//! Session orchestration.
//!
//! `run` walks resolve → stage → spawn and then hands the process to two
//! tasks sharing one cancellation token:
//!
//! - the drain task decodes PTY output into characters and feeds the
//!   output queue; when output ends or the session is cancelled it releases
//!   the staged files, cancels, and closes the output queue
//! - the input task writes queued chunks to the PTY; on cancellation or
//!   when the input queue closes it kills the child

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use cmdrun_common::{CommandId, TerminalOptions};
use cmdrun_config::RunConfig;
use cmdrun_pty::{
    ExitSignal, ProcessKiller, PtySink, PtySource, PtySpawner, SpawnRequest, Utf8Decoder,
};
use cmdrun_store::{BlobStore, CommandStore};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::RunnerError;
use crate::staging::{stage_files, CleanupStack};

/// How long the input task waits for a killed child to be reaped.
const KILL_REAP_TIMEOUT: Duration = Duration::from_secs(5);

/// Settings injected into the runner.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Working directory for commands without their own.
    pub default_dir: PathBuf,
    /// Environment applied to every command, before session overrides.
    pub env: Vec<(String, String)>,
    pub input_queue_capacity: usize,
    pub output_queue_capacity: usize,
}

impl RunnerConfig {
    pub fn from_run_config(config: &RunConfig) -> Self {
        Self {
            default_dir: config.resolved_default_dir(),
            env: config
                .env
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            input_queue_capacity: config.input_queue_capacity.max(1),
            output_queue_capacity: config.output_queue_capacity.max(1),
        }
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self::from_run_config(&RunConfig::default())
    }
}

/// The caller's side of a running session.
///
/// Write keystrokes to `input`, read characters from `output`. `output`
/// closing means the session is over and its staged files are gone.
#[derive(Debug)]
pub struct Session {
    pub input: mpsc::Sender<String>,
    pub output: mpsc::Receiver<char>,
    cancel: CancellationToken,
}

impl Session {
    /// Stop the session: kills the child and closes both queues.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Token that fires when the session ends for any reason.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn into_parts(self) -> (mpsc::Sender<String>, mpsc::Receiver<char>, CancellationToken) {
        (self.input, self.output, self.cancel)
    }
}

/// Starts sessions against a command store, a blob store, and a spawner.
#[derive(Clone)]
pub struct SessionRunner {
    config: RunnerConfig,
    commands: Arc<dyn CommandStore>,
    blobs: Arc<dyn BlobStore>,
    spawner: Arc<dyn PtySpawner>,
}

impl SessionRunner {
    pub fn new(
        config: RunnerConfig,
        commands: Arc<dyn CommandStore>,
        blobs: Arc<dyn BlobStore>,
        spawner: Arc<dyn PtySpawner>,
    ) -> Self {
        Self {
            config,
            commands,
            blobs,
            spawner,
        }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Start command `id`.
    ///
    /// The session's token is a child of `parent`: cancelling `parent` ends
    /// the session, while the session ending leaves `parent` untouched.
    pub async fn run(
        &self,
        parent: &CancellationToken,
        id: CommandId,
        options: &TerminalOptions,
    ) -> Result<Session, RunnerError> {
        let command = self.commands.command(id).await.map_err(|e| {
            if e.is_not_found() {
                RunnerError::NotFound(id)
            } else {
                RunnerError::Store(e)
            }
        })?;
        if command.is_blank() {
            return Err(RunnerError::EmptyCommand(id));
        }

        let workdir = command
            .dir
            .clone()
            .filter(|dir| !dir.as_os_str().is_empty())
            .unwrap_or_else(|| self.config.default_dir.clone());
        if !workdir.is_dir() {
            return Err(RunnerError::MissingWorkDir(workdir));
        }

        let files = self.commands.command_files(id).await?;
        let cleanup = stage_files(&workdir, &files, self.blobs.as_ref()).await?;

        let (rows, cols) = options.geometry();
        let mut env = self.config.env.clone();
        env.extend(options.env.iter().cloned());
        let request = SpawnRequest {
            command: command.command.clone(),
            workdir,
            env,
            rows,
            cols,
        };

        // On failure `cleanup` drops here and removes the staged files.
        let process = self.spawner.spawn(&request)?;

        tracing::info!(
            command_id = %id,
            workdir = %request.workdir.display(),
            staged = cleanup.len(),
            rows,
            cols,
            "session started"
        );

        let (source, sink, exit, killer) = process.into_parts();
        let (input_tx, input_rx) = mpsc::channel(self.config.input_queue_capacity);
        let (output_tx, output_rx) = mpsc::channel(self.config.output_queue_capacity);
        let cancel = parent.child_token();

        tokio::spawn(drain_output(source, output_tx, cancel.clone(), cleanup, id));
        tokio::spawn(deliver_input(
            input_rx,
            sink,
            exit,
            killer,
            cancel.clone(),
            id,
        ));

        Ok(Session {
            input: input_tx,
            output: output_rx,
            cancel,
        })
    }
}

/// PTY output → output queue, one character at a time.
async fn drain_output(
    mut source: PtySource,
    output: mpsc::Sender<char>,
    cancel: CancellationToken,
    cleanup: CleanupStack,
    id: CommandId,
) {
    let mut decoder = Utf8Decoder::new();

    'read: loop {
        let chunk = tokio::select! {
            _ = cancel.cancelled() => break,
            chunk = source.recv() => chunk,
        };

        let (chars, ended) = match chunk {
            Some(bytes) => (decoder.decode(&bytes), false),
            None => (decoder.finish().into_iter().collect::<Vec<_>>(), true),
        };

        for ch in chars {
            tokio::select! {
                _ = cancel.cancelled() => break 'read,
                sent = output.send(ch) => {
                    if sent.is_err() {
                        break 'read;
                    }
                }
            }
        }

        if ended {
            break;
        }
    }

    cleanup.run();
    cancel.cancel();
    drop(output);
    tracing::debug!(command_id = %id, "output drained");
}

/// Keystrokes → PTY, until cancellation or the input queue closes.
async fn deliver_input(
    mut input: mpsc::Receiver<String>,
    mut sink: PtySink,
    exit: ExitSignal,
    killer: ProcessKiller,
    cancel: CancellationToken,
    id: CommandId,
) {
    loop {
        let chunk = tokio::select! {
            _ = cancel.cancelled() => break,
            chunk = input.recv() => chunk,
        };
        let Some(chunk) = chunk else { break };

        if let Err(e) = sink.write_all(chunk.into_bytes()).await {
            tracing::warn!(command_id = %id, error = %e, "writing input to command failed");
            break;
        }
    }

    input.close();
    sink.close();
    if let Err(e) = killer.kill() {
        tracing::warn!(command_id = %id, error = %e, "killing command failed");
    }
    cancel.cancel();

    match tokio::time::timeout(KILL_REAP_TIMEOUT, exit.wait()).await {
        Ok(Ok(())) => tracing::debug!(command_id = %id, "command finished"),
        Ok(Err(e)) => tracing::debug!(command_id = %id, error = %e, "command finished"),
        Err(_) => tracing::warn!(command_id = %id, "command was not reaped after kill"),
    }
}
