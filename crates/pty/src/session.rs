// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! PTY creation and the I/O plumbing of one session.
//!
//! A session's OS-facing side is three tasks: a blocking reader draining
//! the PTY, a writer applying stdin bytes, and a waiter reporting the exit
//! code. Everything they produce funnels into one [`PtyEvent`] stream the
//! manager consumes; disposal works by killing the child, which unblocks
//! the reader and waiter naturally.

use portable_pty::{native_pty_system, ChildKiller, CommandBuilder, MasterPty, PtySize};
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::env::filtered_env;

#[derive(Debug, Error)]
pub enum PtyError {
    #[error("terminal not found")]
    NotFound,

    #[error("write exceeds {max} bytes ({len} bytes)", max = crate::MAX_WRITE_LEN)]
    PayloadTooLarge { len: usize },

    #[error("dimensions out of range: {cols}x{rows}")]
    InvalidDimensions { cols: u16, rows: u16 },

    #[error("terminal is closed")]
    Closed,

    #[error("failed to spawn pty: {0}")]
    Spawn(String),
}

/// Everything a session reports upward.
#[derive(Debug, PartialEq, Eq)]
pub enum PtyEvent {
    Output(Vec<u8>),
    Exit(Option<i32>),
}

/// The OS-facing half of a session, ready to be adopted by the manager.
///
/// Built by [`spawn_shell`] for real PTYs; tests construct one from bare
/// channels to drive the manager without an OS terminal.
pub struct SessionIo {
    /// Stdin bytes; the writer task applies them in order.
    pub writer_tx: mpsc::Sender<Vec<u8>>,
    /// Output and exit, in emission order.
    pub events_rx: mpsc::Receiver<PtyEvent>,
    /// Resize callback into the PTY master, when one exists.
    pub resize: Option<Box<dyn Fn(u16, u16) -> Result<(), String> + Send + Sync>>,
    /// Hard-kill handle, independent of the wait task.
    pub killer: Option<Box<dyn ChildKiller + Send + Sync>>,
    /// OS process id of the child, for polite POSIX signalling.
    pub pid: Option<u32>,
}

impl SessionIo {
    /// A bare pair of channels with no process behind it.
    pub fn from_channels(
        writer_tx: mpsc::Sender<Vec<u8>>,
        events_rx: mpsc::Receiver<PtyEvent>,
    ) -> Self {
        Self { writer_tx, events_rx, resize: None, killer: None, pid: None }
    }
}

/// Spawn a shell (or a one-shot command under the shell) on a fresh PTY
/// with the filtered environment.
pub fn spawn_shell(
    cwd: &Path,
    cols: u16,
    rows: u16,
    command: Option<&str>,
) -> Result<SessionIo, PtyError> {
    let pty_system = native_pty_system();
    let pair = pty_system
        .openpty(PtySize { rows, cols, pixel_width: 0, pixel_height: 0 })
        .map_err(|e| PtyError::Spawn(e.to_string()))?;

    let shell = default_shell();
    let mut builder = CommandBuilder::new(&shell);
    if let Some(command) = command {
        builder.arg("-lc");
        builder.arg(command);
    }
    builder.cwd(cwd);
    builder.env_clear();
    for (name, value) in filtered_env() {
        builder.env(name, value);
    }

    let mut child =
        pair.slave.spawn_command(builder).map_err(|e| PtyError::Spawn(e.to_string()))?;
    let killer = child.clone_killer();
    let pid = child.process_id();

    let (writer_tx, mut writer_rx) = mpsc::channel::<Vec<u8>>(128);
    let (events_tx, events_rx) = mpsc::channel::<PtyEvent>(256);

    // Reader task: drain the PTY into the event stream.
    let mut reader =
        pair.master.try_clone_reader().map_err(|e| PtyError::Spawn(e.to_string()))?;
    let reader_events = events_tx.clone();
    tokio::task::spawn_blocking(move || {
        let mut buf = [0u8; 8192];
        loop {
            match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    if reader_events.blocking_send(PtyEvent::Output(buf[..n].to_vec())).is_err() {
                        break;
                    }
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(_) => break,
            }
        }
    });

    // Writer task: apply stdin writes on a blocking thread.
    let writer = pair.master.take_writer().map_err(|e| PtyError::Spawn(e.to_string()))?;
    let writer = Arc::new(parking_lot::Mutex::new(writer));
    tokio::spawn(async move {
        while let Some(bytes) = writer_rx.recv().await {
            let writer = Arc::clone(&writer);
            let _ = tokio::task::spawn_blocking(move || {
                use std::io::Write;
                let mut guard = writer.lock();
                let _ = guard.write_all(&bytes);
                let _ = guard.flush();
            })
            .await;
        }
    });

    // Wait task: report the exit code once.
    tokio::task::spawn_blocking(move || {
        let code = child.wait().ok().map(|status| status.exit_code() as i32);
        let _ = events_tx.blocking_send(PtyEvent::Exit(code));
    });

    // Keep the master alive inside the resize closure.
    let master: Box<dyn MasterPty + Send> = pair.master;
    let master = Arc::new(parking_lot::Mutex::new(master));
    let resize = Box::new(move |cols: u16, rows: u16| {
        master
            .lock()
            .resize(PtySize { rows, cols, pixel_width: 0, pixel_height: 0 })
            .map_err(|e| e.to_string())
    });

    Ok(SessionIo { writer_tx, events_rx, resize: Some(resize), killer: Some(killer), pid })
}

fn default_shell() -> String {
    if cfg!(windows) {
        "powershell.exe".to_string()
    } else {
        std::env::var("SHELL").unwrap_or_else(|_| "/bin/bash".to_string())
    }
}
