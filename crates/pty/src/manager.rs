// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The PTY session manager: registration, subscriber fan-out, batching,
//! backpressure, inactivity reaping, and shutdown.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use forks_core::{DomainEvent, EventBus, EventVerb, TerminalId, TerminalOwner, TerminalSession};
use forks_wire::{encode_server, ServerFrame};
use parking_lot::Mutex;
use portable_pty::ChildKiller;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::session::{PtyError, PtyEvent, SessionIo};
use crate::{
    BACKPRESSURE_LIMIT, BATCH_DELAY, BATCH_MAX, COLS_RANGE, HISTORY_MAX, IDLE_TIMEOUT,
    MAX_WRITE_LEN, ROWS_RANGE, SHUTDOWN_GRACE,
};

/// Identity of an attached subscriber (the gateway's connection id).
pub type SubscriberKey = u64;

/// A consumer of serialized PTY frames. The driver reports its own
/// outbound buffer level; the manager never tries to measure queue depth
/// itself.
pub trait OutputSink: Send + Sync {
    fn buffered_bytes(&self) -> usize;
    fn send_frame(&self, frame: Arc<str>);
}

/// Options for adopting a PTY into the manager.
pub struct RegisterOptions {
    pub cwd: std::path::PathBuf,
    pub owner: TerminalOwner,
    pub visible: bool,
    pub command: Option<String>,
    /// Invoked once, after the exit frame has been fanned out.
    pub on_close: Option<Box<dyn FnOnce(Option<i32>) + Send>>,
}

impl Default for RegisterOptions {
    fn default() -> Self {
        Self {
            cwd: std::path::PathBuf::from("."),
            owner: TerminalOwner::User,
            visible: true,
            command: None,
            on_close: None,
        }
    }
}

type Resizer = Box<dyn Fn(u16, u16) -> Result<(), String> + Send + Sync>;
type CloseHook = Box<dyn FnOnce(Option<i32>) + Send>;

/// State shared between the manager surface and the session's pump task.
struct SessionShared {
    meta: Mutex<TerminalSession>,
    history: Mutex<VecDeque<u8>>,
    subscribers: Mutex<HashMap<SubscriberKey, Arc<dyn OutputSink>>>,
    last_activity: Mutex<Instant>,
    exited: AtomicBool,
    killer: Mutex<Option<Box<dyn ChildKiller + Send + Sync>>>,
    on_close: Mutex<Option<CloseHook>>,
}

impl SessionShared {
    fn append_history(&self, bytes: &[u8]) {
        let mut history = self.history.lock();
        history.extend(bytes.iter().copied());
        let excess = history.len().saturating_sub(HISTORY_MAX);
        if excess > 0 {
            history.drain(..excess);
        }
    }

    fn touch(&self) {
        *self.last_activity.lock() = Instant::now();
    }

    /// Idle deadline, or `None` when the session is exempt from reaping
    /// (user-owned, visible, or already exited).
    fn idle_deadline(&self) -> Option<Instant> {
        if self.exited.load(Ordering::SeqCst) {
            return None;
        }
        let meta = self.meta.lock();
        if meta.owner != TerminalOwner::Agent || meta.visible {
            return None;
        }
        Some(*self.last_activity.lock() + IDLE_TIMEOUT)
    }

    fn mark_exited(&self, code: Option<i32>) {
        self.exited.store(true, Ordering::SeqCst);
        self.meta.lock().exit_code = code;
    }

    /// Hard-kill the child. Returns whether a kill handle existed.
    fn kill(&self) -> bool {
        match self.killer.lock().take() {
            Some(mut killer) => {
                if let Err(e) = killer.kill() {
                    tracing::debug!(error = %e, "pty kill failed (process likely gone)");
                }
                true
            }
            None => false,
        }
    }
}

struct SessionEntry {
    shared: Arc<SessionShared>,
    writer_tx: mpsc::Sender<Vec<u8>>,
    resize: Option<Resizer>,
    pid: Option<u32>,
    pump: tokio::task::JoinHandle<()>,
}

/// Owns every terminal session in the daemon.
pub struct PtyManager {
    sessions: Mutex<HashMap<TerminalId, Arc<SessionEntry>>>,
    bus: EventBus,
}

impl PtyManager {
    pub fn new(bus: EventBus) -> Self {
        Self { sessions: Mutex::new(HashMap::new()), bus }
    }

    /// Adopt an externally created PTY under `id`.
    pub fn register(&self, id: TerminalId, io: SessionIo, opts: RegisterOptions) {
        let meta = TerminalSession {
            id,
            cwd: opts.cwd,
            owner: opts.owner,
            visible: opts.visible,
            created_at: Utc::now(),
            command: opts.command,
            exit_code: None,
        };
        self.emit_terminal(EventVerb::Created, meta.clone());

        let shared = Arc::new(SessionShared {
            meta: Mutex::new(meta),
            history: Mutex::new(VecDeque::new()),
            subscribers: Mutex::new(HashMap::new()),
            last_activity: Mutex::new(Instant::now()),
            exited: AtomicBool::new(false),
            killer: Mutex::new(io.killer),
            on_close: Mutex::new(opts.on_close),
        });

        let pump = tokio::spawn(pump(
            id,
            Arc::clone(&shared),
            io.events_rx,
            self.bus.clone(),
        ));

        let entry = Arc::new(SessionEntry {
            shared,
            writer_tx: io.writer_tx,
            resize: io.resize,
            pid: io.pid,
            pump,
        });
        self.sessions.lock().insert(id, entry);
    }

    /// Drop the session entirely: kill the child if still running, stop
    /// the pump, release history and subscribers. No exit frame is sent.
    pub fn unregister(&self, id: &TerminalId) -> bool {
        let Some(entry) = self.sessions.lock().remove(id) else {
            return false;
        };
        if !entry.shared.exited.load(Ordering::SeqCst) {
            entry.shared.kill();
        }
        entry.pump.abort();
        entry.shared.subscribers.lock().clear();
        entry.shared.history.lock().clear();
        true
    }

    /// Subscribe to output; returns the buffered history for replay.
    pub fn attach(
        &self,
        id: &TerminalId,
        key: SubscriberKey,
        sink: Arc<dyn OutputSink>,
    ) -> Result<String, PtyError> {
        let entry = self.entry(id)?;
        entry.shared.subscribers.lock().insert(key, sink);
        let history = entry.shared.history.lock();
        Ok(String::from_utf8_lossy(&history.iter().copied().collect::<Vec<u8>>()).into_owned())
    }

    pub fn detach(&self, id: &TerminalId, key: SubscriberKey) {
        if let Ok(entry) = self.entry(id) {
            entry.shared.subscribers.lock().remove(&key);
        }
    }

    /// Remove the subscriber from every session (connection closed).
    pub fn detach_all(&self, key: SubscriberKey) {
        for entry in self.sessions.lock().values() {
            entry.shared.subscribers.lock().remove(&key);
        }
    }

    /// Write user/agent input into the PTY.
    pub async fn write(&self, id: &TerminalId, data: &[u8]) -> Result<(), PtyError> {
        if data.len() > MAX_WRITE_LEN {
            return Err(PtyError::PayloadTooLarge { len: data.len() });
        }
        let entry = self.entry(id)?;
        if entry.shared.exited.load(Ordering::SeqCst) {
            return Err(PtyError::Closed);
        }
        entry.shared.touch();
        entry.writer_tx.send(data.to_vec()).await.map_err(|_| PtyError::Closed)
    }

    pub fn resize(&self, id: &TerminalId, cols: u16, rows: u16) -> Result<(), PtyError> {
        if !COLS_RANGE.contains(&cols) || !ROWS_RANGE.contains(&rows) {
            return Err(PtyError::InvalidDimensions { cols, rows });
        }
        let entry = self.entry(id)?;
        if let Some(resize) = &entry.resize {
            resize(cols, rows).map_err(PtyError::Spawn)?;
        }
        Ok(())
    }

    /// Change visibility. Promoting an agent-owned session to visible
    /// transfers ownership to the user and disarms the idle reaper.
    pub fn set_visible(&self, id: &TerminalId, visible: bool) -> Result<(), PtyError> {
        let entry = self.entry(id)?;
        let meta = {
            let mut meta = entry.shared.meta.lock();
            if visible && meta.owner == TerminalOwner::Agent {
                meta.owner = TerminalOwner::User;
            }
            meta.visible = visible;
            meta.clone()
        };
        entry.shared.touch();
        self.emit_terminal(EventVerb::Updated, meta);
        Ok(())
    }

    // --- read accessors ---

    pub fn get_history(&self, id: &TerminalId) -> Option<Vec<u8>> {
        let entry = self.sessions.lock().get(id).cloned()?;
        let history = entry.shared.history.lock();
        Some(history.iter().copied().collect())
    }

    pub fn get_metadata(&self, id: &TerminalId) -> Option<TerminalSession> {
        self.sessions.lock().get(id).map(|e| e.shared.meta.lock().clone())
    }

    pub fn list(&self) -> Vec<TerminalId> {
        self.sessions.lock().keys().copied().collect()
    }

    pub fn list_with_metadata(&self) -> Vec<TerminalSession> {
        self.sessions.lock().values().map(|e| e.shared.meta.lock().clone()).collect()
    }

    pub fn has(&self, id: &TerminalId) -> bool {
        self.sessions.lock().contains_key(id)
    }

    pub fn get_exit_code(&self, id: &TerminalId) -> Option<i32> {
        self.sessions.lock().get(id).and_then(|e| e.shared.meta.lock().exit_code)
    }

    /// Request a graceful exit from every session, wait out the grace
    /// period, then terminate whatever is left.
    pub async fn shutdown_all(&self) {
        let entries: Vec<Arc<SessionEntry>> = self.sessions.lock().values().cloned().collect();

        for entry in &entries {
            if entry.shared.exited.load(Ordering::SeqCst) {
                continue;
            }
            request_graceful_exit(entry).await;
        }

        let deadline = Instant::now() + SHUTDOWN_GRACE;
        loop {
            let all_exited =
                entries.iter().all(|e| e.shared.exited.load(Ordering::SeqCst));
            if all_exited || Instant::now() >= deadline {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(25)).await;
        }

        for entry in &entries {
            if !entry.shared.exited.load(Ordering::SeqCst) {
                entry.shared.kill();
            }
        }
        self.sessions.lock().clear();
    }

    fn entry(&self, id: &TerminalId) -> Result<Arc<SessionEntry>, PtyError> {
        self.sessions.lock().get(id).cloned().ok_or(PtyError::NotFound)
    }

    fn emit_terminal(&self, verb: EventVerb, terminal: TerminalSession) {
        self.bus.emit(&DomainEvent::Terminal { event: verb, terminal });
    }
}

/// Polite shutdown: `exit\r` into the shell on Windows, SIGTERM on POSIX.
async fn request_graceful_exit(entry: &SessionEntry) {
    #[cfg(unix)]
    {
        if let Some(pid) = entry.pid {
            let pid = nix::unistd::Pid::from_raw(pid as i32);
            if let Err(e) = nix::sys::signal::kill(pid, nix::sys::signal::Signal::SIGTERM) {
                tracing::debug!(error = %e, "SIGTERM failed (process likely gone)");
            }
            return;
        }
    }
    let _ = entry.writer_tx.send(b"exit\r".to_vec()).await;
}

/// Per-session event loop: history append, output coalescing, subscriber
/// fan-out, idle reaping, exit delivery.
async fn pump(
    id: TerminalId,
    shared: Arc<SessionShared>,
    mut events_rx: mpsc::Receiver<PtyEvent>,
    bus: EventBus,
) {
    let mut pending: Vec<u8> = Vec::new();
    let mut flush_at: Option<Instant> = None;
    let mut reaped = false;

    loop {
        let idle_at = if reaped { None } else { shared.idle_deadline() };
        tokio::select! {
            event = events_rx.recv() => match event {
                Some(PtyEvent::Output(bytes)) => {
                    shared.append_history(&bytes);
                    shared.touch();
                    pending.extend_from_slice(&bytes);
                    if pending.len() >= BATCH_MAX {
                        flush(&id, &shared, &mut pending);
                        flush_at = None;
                    } else if flush_at.is_none() {
                        flush_at = Some(Instant::now() + BATCH_DELAY);
                    }
                }
                Some(PtyEvent::Exit(code)) => {
                    flush(&id, &shared, &mut pending);
                    deliver_exit(&id, &shared, &bus, code);
                    break;
                }
                None => {
                    // Producer side dropped without an exit report.
                    flush(&id, &shared, &mut pending);
                    deliver_exit(&id, &shared, &bus, None);
                    break;
                }
            },
            _ = sleep_until_opt(flush_at), if flush_at.is_some() => {
                flush(&id, &shared, &mut pending);
                flush_at = None;
            }
            _ = sleep_until_opt(idle_at), if idle_at.is_some() => {
                tracing::info!(terminal = %id, "reaping idle agent session");
                reaped = true;
                // With a real child, the kill surfaces as an Exit event from
                // the wait task. Without one (adopted channels), synthesize
                // the exit so the loop terminates.
                if !shared.kill() {
                    flush(&id, &shared, &mut pending);
                    deliver_exit(&id, &shared, &bus, None);
                    break;
                }
            }
        }
    }
}

async fn sleep_until_opt(at: Option<Instant>) {
    match at {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

/// Serialize the combined batch once and fan it out, skipping subscribers
/// under backpressure (history already has the bytes).
fn flush(id: &TerminalId, shared: &SessionShared, pending: &mut Vec<u8>) {
    if pending.is_empty() {
        return;
    }
    let data = String::from_utf8_lossy(pending).into_owned();
    pending.clear();
    let frame = ServerFrame::PtyOutput { id: *id, data };
    let Ok(serialized) = encode_server(&frame) else {
        return;
    };
    let serialized: Arc<str> = serialized.into();

    let subscribers: Vec<Arc<dyn OutputSink>> =
        shared.subscribers.lock().values().cloned().collect();
    for sink in subscribers {
        if sink.buffered_bytes() > BACKPRESSURE_LIMIT {
            continue;
        }
        sink.send_frame(Arc::clone(&serialized));
    }
}

/// Exit frames bypass backpressure: every subscriber hears about the end
/// of a session.
fn deliver_exit(id: &TerminalId, shared: &SessionShared, bus: &EventBus, code: Option<i32>) {
    shared.mark_exited(code);

    let frame = ServerFrame::PtyExit { id: *id, exit_code: code };
    if let Ok(serialized) = encode_server(&frame) {
        let serialized: Arc<str> = serialized.into();
        let subscribers: Vec<Arc<dyn OutputSink>> =
            shared.subscribers.lock().values().cloned().collect();
        for sink in subscribers {
            sink.send_frame(Arc::clone(&serialized));
        }
    }

    bus.emit(&DomainEvent::Terminal {
        event: EventVerb::Updated,
        terminal: shared.meta.lock().clone(),
    });

    if let Some(on_close) = shared.on_close.lock().take() {
        on_close(code);
    }
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
