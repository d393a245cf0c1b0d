//! Local Terminal Session
//!
//! One shell process bound to a PTY. Output and exit are delivered, in
//! order, on the event stream returned by [`PtySession::open`].
//!
//! ```text
//! Starting ──spawn ok──▶ Running ──child exit / kill()──▶ Exited
//!     │                                                     ▲
//!     └──────────────────────── kill() ─────────────────────┘
//! ```
//!
//! Each running session owns three threads: a read pump (PTY → events), a
//! write pump (input queue → PTY) and a waiter that reaps the child.

use bytes::Bytes;
use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::local::priming::{PrimingQueue, PRIMING_SETTLE_DELAY};
use crate::local::pty::{LaunchSpec, PtyError, PtyHandle, SpawnedPty};
use crate::local::shell::{spawn_chain, Platform, ShellInfo};

/// How long `kill()` waits for the child to be reaped
const KILL_REAP_TIMEOUT: Duration = Duration::from_millis(500);
/// How long the waiter lets the read pump drain after the child exited
const READER_DRAIN_TIMEOUT: Duration = Duration::from_millis(250);
/// Reported when a killed child could not be reaped in time
pub const UNREAPED_EXIT_CODE: i32 = -1;

const READ_CHUNK: usize = 8192;

/// Lifecycle state of a session
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Starting,
    Running,
    Exited,
}

/// Events emitted by a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Output chunk from the PTY (or the spawn-failure diagnostic)
    Data(Bytes),
    /// The child terminated; delivered at most once
    Exit(i32),
}

pub type SessionEvents = mpsc::UnboundedReceiver<SessionEvent>;

struct Inner {
    state: SessionState,
    cols: u16,
    rows: u16,
    /// Set by `kill()` before the child is signalled
    muted: bool,
    /// Exit code once the waiter reaped the child
    reaped: Option<i32>,
    events: Option<mpsc::UnboundedSender<SessionEvent>>,
    input_tx: Option<mpsc::UnboundedSender<Vec<u8>>>,
    pty: Option<PtyHandle>,
    shell: Option<ShellInfo>,
}

/// State shared between the session and its pump threads
struct Shared {
    inner: Mutex<Inner>,
    reaped: Condvar,
}

impl Shared {
    fn is_running(&self) -> bool {
        let inner = self.inner.lock();
        inner.state == SessionState::Running && !inner.muted
    }

    fn emit_data(&self, chunk: Bytes) -> bool {
        let inner = self.inner.lock();
        if inner.state != SessionState::Running || inner.muted {
            return false;
        }
        match &inner.events {
            Some(tx) => tx.send(SessionEvent::Data(chunk)).is_ok(),
            None => false,
        }
    }

    /// Move to Exited and deliver the single exit event. Returns false if the
    /// session had already exited.
    fn emit_exit(&self, code: i32) -> bool {
        let mut inner = self.inner.lock();
        if inner.state == SessionState::Exited {
            return false;
        }
        inner.state = SessionState::Exited;
        inner.input_tx = None;
        if let Some(tx) = inner.events.take() {
            let _ = tx.send(SessionEvent::Exit(code));
        }
        true
    }

    fn record_reaped(&self, code: i32) {
        let mut inner = self.inner.lock();
        inner.reaped = Some(code);
        // Child is gone, release the PTY master
        inner.pty = None;
        self.reaped.notify_all();
    }

    fn wait_reaped(&self, timeout: Duration) -> Option<i32> {
        let deadline = Instant::now() + timeout;
        let mut inner = self.inner.lock();
        while inner.reaped.is_none() {
            if self.reaped.wait_until(&mut inner, deadline).timed_out() {
                break;
            }
        }
        inner.reaped
    }

    fn send_input(&self, data: Vec<u8>) -> bool {
        let inner = self.inner.lock();
        if inner.state != SessionState::Running || inner.muted {
            return false;
        }
        match &inner.input_tx {
            Some(tx) => tx.send(data).is_ok(),
            None => false,
        }
    }
}

/// A local terminal session
pub struct PtySession {
    /// Unique session ID
    id: String,
    shared: Arc<Shared>,
}

impl PtySession {
    /// Spawn the shell described by `spec`, trying the platform fallback
    /// chain in order. Must be called within a tokio runtime.
    ///
    /// If every candidate fails the session stays in `Starting` and a single
    /// diagnostic `Data` chunk is the only event ever delivered.
    pub async fn open(spec: LaunchSpec, priming: PrimingQueue) -> (Self, SessionEvents) {
        let candidates = spawn_chain(Platform::current(), &spec.shell_path);
        Self::open_with_candidates(spec, candidates, priming).await
    }

    /// Like [`PtySession::open`] with an explicit candidate list
    pub async fn open_with_candidates(
        spec: LaunchSpec,
        candidates: Vec<PathBuf>,
        priming: PrimingQueue,
    ) -> (Self, SessionEvents) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let session = Self {
            id: Uuid::new_v4().to_string(),
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    state: SessionState::Starting,
                    cols: spec.initial_cols,
                    rows: spec.initial_rows,
                    muted: false,
                    reaped: None,
                    events: Some(event_tx),
                    input_tx: None,
                    pty: None,
                    shell: None,
                }),
                reaped: Condvar::new(),
            }),
        };

        let mut last_error: Option<PtyError> = None;
        for shell in &candidates {
            match PtyHandle::spawn(&spec, shell) {
                Ok(spawned) => {
                    session.start(spawned, priming);
                    return (session, event_rx);
                }
                Err(e) => last_error = Some(e),
            }
        }

        let reason = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no shell candidates".to_string());
        tracing::error!("Session {}: every shell failed to start: {}", session.id, reason);
        session.emit_diagnostic(&reason);
        (session, event_rx)
    }

    fn emit_diagnostic(&self, reason: &str) {
        let message = format!(
            "Failed to start a shell: {}\n\nTry launching from a terminal: youyou --title \"Dev\" --bg \"#1a1a2e\"",
            reason
        );
        let framed = format!("\r\n\x1b[31m{}\x1b[0m\r\n", message.replace('\n', "\r\n"));
        if let Some(tx) = &self.shared.inner.lock().events {
            let _ = tx.send(SessionEvent::Data(Bytes::from(framed)));
        }
    }

    fn start(&self, spawned: SpawnedPty, priming: PrimingQueue) {
        let SpawnedPty {
            handle,
            mut child,
            reader,
            writer,
        } = spawned;

        let (input_tx, input_rx) = mpsc::unbounded_channel::<Vec<u8>>();
        let shell_label = handle.shell().label.clone();
        {
            let mut inner = self.shared.inner.lock();
            inner.shell = Some(handle.shell().clone());
            inner.pty = Some(handle);
            inner.input_tx = Some(input_tx);
            inner.state = SessionState::Running;
        }

        spawn_write_pump(self.id.clone(), writer, input_rx);
        let reader_done = spawn_read_pump(
            self.id.clone(),
            self.shared.clone(),
            reader,
            priming,
            tokio::runtime::Handle::current(),
        );

        // Waiter: reap the child, let the read pump drain, then report exit
        let shared = self.shared.clone();
        let session_id = self.id.clone();
        let spawn_result = std::thread::Builder::new()
            .name("pty-waiter".to_string())
            .spawn(move || {
                let code = match child.wait() {
                    Ok(status) => status.exit_code() as i32,
                    Err(e) => {
                        tracing::warn!("Session {}: wait failed: {}", session_id, e);
                        UNREAPED_EXIT_CODE
                    }
                };
                tracing::debug!("Session {}: child exited with code {}", session_id, code);
                shared.record_reaped(code);
                let _ = reader_done.recv_timeout(READER_DRAIN_TIMEOUT);
                if shared.emit_exit(code) {
                    tracing::info!("Local terminal session {} exited ({})", session_id, code);
                }
            });
        if let Err(e) = spawn_result {
            tracing::error!("Session {}: failed to start waiter thread: {}", self.id, e);
        }

        tracing::info!(
            "Local terminal session {} started with shell: {}",
            self.id,
            shell_label
        );
    }

    /// Session ID, stable for the lifetime of the session
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> SessionState {
        self.shared.inner.lock().state
    }

    pub fn is_running(&self) -> bool {
        self.state() == SessionState::Running
    }

    pub fn is_exited(&self) -> bool {
        self.state() == SessionState::Exited
    }

    /// Current terminal size as (cols, rows)
    pub fn size(&self) -> (u16, u16) {
        let inner = self.shared.inner.lock();
        (inner.cols, inner.rows)
    }

    /// Shell the session ended up running, if any spawned
    pub fn shell(&self) -> Option<ShellInfo> {
        self.shared.inner.lock().shell.clone()
    }

    /// Forward input to the shell. Ignored unless the session is running.
    pub fn write(&self, data: &[u8]) {
        if !self.shared.send_input(data.to_vec()) {
            tracing::debug!("Session {}: dropped {} input bytes (not running)", self.id, data.len());
        }
    }

    /// Resize the terminal. Ignored unless the session is running.
    pub fn resize(&self, cols: u16, rows: u16) {
        let mut inner = self.shared.inner.lock();
        if inner.state != SessionState::Running || inner.muted {
            tracing::debug!("Session {}: resize ignored (not running)", self.id);
            return;
        }
        let result = match &inner.pty {
            Some(pty) => pty.resize(cols, rows),
            None => return,
        };
        match result {
            Ok(()) => {
                inner.cols = cols;
                inner.rows = rows;
            }
            Err(e) => tracing::warn!("Session {}: resize to {}x{} failed: {}", self.id, cols, rows, e),
        }
    }

    /// Terminate the child and move to `Exited`. No event is delivered after
    /// this returns; a running session delivers its single `Exit` here unless
    /// it already had. Idempotent.
    pub fn kill(&self) {
        let pty = {
            let mut inner = self.shared.inner.lock();
            match inner.state {
                SessionState::Exited => return,
                SessionState::Starting => {
                    inner.state = SessionState::Exited;
                    inner.events = None;
                    tracing::info!("Closing local terminal session {} (never started)", self.id);
                    return;
                }
                SessionState::Running => {
                    if inner.muted {
                        // Another kill() is in flight
                        None
                    } else {
                        inner.muted = true;
                        inner.input_tx = None;
                        inner.pty.take()
                    }
                }
            }
        };

        tracing::info!("Closing local terminal session {}", self.id);
        if let Some(pty) = pty {
            if let Err(e) = pty.kill_process_group() {
                tracing::warn!("Session {}: kill failed: {}", self.id, e);
            }
        }

        let code = self.shared.wait_reaped(KILL_REAP_TIMEOUT).unwrap_or_else(|| {
            tracing::warn!("Session {}: child not reaped after kill", self.id);
            UNREAPED_EXIT_CODE
        });
        self.shared.emit_exit(code);
    }

    /// Get session info for serialization
    pub fn info(&self) -> SessionInfo {
        let inner = self.shared.inner.lock();
        SessionInfo {
            id: self.id.clone(),
            shell: inner.shell.clone(),
            cols: inner.cols,
            rows: inner.rows,
            state: inner.state,
        }
    }
}

impl Drop for PtySession {
    fn drop(&mut self) {
        self.kill();
    }
}

fn spawn_write_pump(
    session_id: String,
    mut writer: Box<dyn Write + Send>,
    mut input_rx: mpsc::UnboundedReceiver<Vec<u8>>,
) {
    let result = std::thread::Builder::new()
        .name("pty-writer".to_string())
        .spawn(move || {
            while let Some(data) = input_rx.blocking_recv() {
                if let Err(e) = writer.write_all(&data).and_then(|_| writer.flush()) {
                    tracing::error!("Session {}: failed to write to PTY: {}", session_id, e);
                    break;
                }
            }
            tracing::debug!("Session {}: write pump terminated", session_id);
        });
    if let Err(e) = result {
        tracing::error!("Failed to start PTY write pump: {}", e);
    }
}

/// Returns a receiver that disconnects when the pump has stopped
fn spawn_read_pump(
    session_id: String,
    shared: Arc<Shared>,
    mut reader: Box<dyn Read + Send>,
    mut priming: PrimingQueue,
    runtime: tokio::runtime::Handle,
) -> std::sync::mpsc::Receiver<()> {
    let (done_tx, done_rx) = std::sync::mpsc::channel::<()>();
    let result = std::thread::Builder::new()
        .name("pty-reader".to_string())
        .spawn(move || {
            let _done = done_tx;
            let mut buf = [0u8; READ_CHUNK];
            loop {
                let n = match reader.read(&mut buf) {
                    Ok(0) => {
                        tracing::debug!("Session {}: PTY EOF", session_id);
                        break;
                    }
                    Ok(n) => n,
                    Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        // EIO once the child side has closed
                        tracing::debug!("Session {}: read pump stopped: {}", session_id, e);
                        break;
                    }
                };

                if !shared.emit_data(Bytes::copy_from_slice(&buf[..n])) {
                    break;
                }

                if let Some(writes) = priming.on_output() {
                    runtime.spawn(deliver_priming(session_id.clone(), shared.clone(), writes));
                }
            }
            tracing::debug!("Session {}: read pump exited", session_id);
        });
    if let Err(e) = result {
        tracing::error!("Failed to start PTY read pump: {}", e);
    }
    done_rx
}

async fn deliver_priming(session_id: String, shared: Arc<Shared>, writes: Vec<Vec<u8>>) {
    tokio::time::sleep(PRIMING_SETTLE_DELAY).await;
    tracing::debug!("Session {}: submitting {} priming lines", session_id, writes.len());
    for line in writes {
        if !shared.send_input(line) {
            tracing::debug!("Session {}: priming stopped, session no longer running", session_id);
            break;
        }
    }
}

/// Serializable session info for the display surface
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInfo {
    pub id: String,
    pub shell: Option<ShellInfo>,
    pub cols: u16,
    pub rows: u16,
    pub state: SessionState,
}
