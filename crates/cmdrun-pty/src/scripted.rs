//! A spawner that never touches the OS.
//!
//! Replays canned output, records input, and counts spawns and kills so
//! session-level code can be tested without a shell.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use portable_pty::ChildKiller;
use tokio::sync::mpsc;

use crate::error::PtyError;
use crate::process::{
    ExitNotifier, ExitSignal, ProcessKiller, PtyProcess, PtySink, PtySource, PtySpawner,
    SpawnRequest,
};

#[derive(Default)]
struct Shared {
    spawns: AtomicUsize,
    kills: AtomicUsize,
    last_request: Mutex<Option<SpawnRequest>>,
    input: Mutex<Vec<u8>>,
    live: Mutex<Vec<LiveChild>>,
}

struct LiveChild {
    exited: Arc<AtomicBool>,
    notifier: Option<ExitNotifier>,
}

/// Scripted stand-in for [`crate::NativePtySpawner`].
#[derive(Clone)]
pub struct ScriptedSpawner {
    output: Vec<u8>,
    pace: Option<Duration>,
    hold_open: bool,
    fail: bool,
    shared: Arc<Shared>,
}

impl ScriptedSpawner {
    /// Every spawned process prints `output` and exits cleanly.
    pub fn new(output: impl Into<Vec<u8>>) -> Self {
        Self {
            output: output.into(),
            pace: None,
            hold_open: false,
            fail: false,
            shared: Arc::default(),
        }
    }

    /// Processes print their output and then keep running until killed.
    pub fn hold_open(mut self) -> Self {
        self.hold_open = true;
        self
    }

    /// Output arrives one character per chunk, `gap` apart, instead of as
    /// a single chunk.
    pub fn paced(mut self, gap: Duration) -> Self {
        self.pace = Some(gap);
        self
    }

    /// Every spawn fails.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(Vec::new())
        }
    }

    pub fn spawn_count(&self) -> usize {
        self.shared.spawns.load(Ordering::SeqCst)
    }

    pub fn kill_count(&self) -> usize {
        self.shared.kills.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<SpawnRequest> {
        self.shared
            .last_request
            .lock()
            .ok()
            .and_then(|guard| guard.clone())
    }

    /// Everything written to any spawned process's input so far.
    pub fn input_received(&self) -> Vec<u8> {
        self.shared
            .input
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

impl PtySpawner for ScriptedSpawner {
    fn spawn(&self, request: &SpawnRequest) -> Result<PtyProcess, PtyError> {
        self.shared.spawns.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut last) = self.shared.last_request.lock() {
            *last = Some(request.clone());
        }
        if self.fail {
            return Err(PtyError::SpawnFailed("scripted failure".into()));
        }

        let (chunk_tx, chunk_rx) = mpsc::channel(1);
        match self.pace {
            Some(gap) => feed_paced(&self.output, gap, chunk_tx.clone())?,
            None => {
                let _ = chunk_tx.try_send(self.output.clone());
            }
        }
        let (notifier, exit) = ExitSignal::channel();
        let exited = Arc::new(AtomicBool::new(false));

        let killer = if self.hold_open {
            // The killer keeps the output channel open and resolves the
            // exit signal when it fires.
            let mut live = self
                .shared
                .live
                .lock()
                .map_err(|_| PtyError::WaitFailed("scripted state poisoned".into()))?;
            live.push(LiveChild {
                exited: exited.clone(),
                notifier: Some(notifier),
            });
            FakeKiller {
                shared: self.shared.clone(),
                index: live.len() - 1,
                keep_open: Some(chunk_tx),
            }
        } else {
            drop(chunk_tx);
            exited.store(true, Ordering::SeqCst);
            notifier.notify(Ok(()));
            FakeKiller {
                shared: self.shared.clone(),
                index: usize::MAX,
                keep_open: None,
            }
        };

        Ok(PtyProcess::new(
            PtySource::new(chunk_rx),
            PtySink::new(Box::new(InputRecorder(self.shared.clone()))),
            exit,
            ProcessKiller::new(Box::new(killer), exited),
        ))
    }
}

/// Send `output` one character at a time from a plain thread, the way the
/// native reader thread feeds the channel.
fn feed_paced(output: &[u8], gap: Duration, tx: mpsc::Sender<Vec<u8>>) -> Result<(), PtyError> {
    let text = String::from_utf8_lossy(output).into_owned();
    thread::Builder::new()
        .name("scripted-feed".to_string())
        .spawn(move || {
            for ch in text.chars() {
                thread::sleep(gap);
                if tx.blocking_send(ch.to_string().into_bytes()).is_err() {
                    break;
                }
            }
        })
        .map(|_| ())
        .map_err(|e| PtyError::SpawnFailed(format!("feed thread: {e}")))
}

struct InputRecorder(Arc<Shared>);

impl std::io::Write for InputRecorder {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if let Ok(mut input) = self.0.input.lock() {
            input.extend_from_slice(buf);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Ends a held-open child: closes its output and resolves its exit signal.
struct FakeKiller {
    shared: Arc<Shared>,
    index: usize,
    keep_open: Option<mpsc::Sender<Vec<u8>>>,
}

impl std::fmt::Debug for FakeKiller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FakeKiller").field("index", &self.index).finish()
    }
}

impl ChildKiller for FakeKiller {
    fn kill(&mut self) -> std::io::Result<()> {
        self.shared.kills.fetch_add(1, Ordering::SeqCst);
        drop(self.keep_open.take());
        if let Ok(mut live) = self.shared.live.lock() {
            if let Some(child) = live.get_mut(self.index) {
                child.exited.store(true, Ordering::SeqCst);
                if let Some(notifier) = child.notifier.take() {
                    notifier.notify(Err(PtyError::WaitFailed("killed".into())));
                }
            }
        }
        Ok(())
    }

    fn clone_killer(&self) -> Box<dyn ChildKiller + Send + Sync> {
        Box::new(FakeKiller {
            shared: self.shared.clone(),
            index: self.index,
            keep_open: None,
        })
    }
}
