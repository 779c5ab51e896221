// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-connection outbound queue with pause/resume watermarks.
//!
//! The queue tracks its own byte depth; that measurement is what the PTY
//! manager and the broadcast path consult for backpressure. Above the
//! high watermark the connection is paused and delta-class frames are
//! dropped; everything else queues regardless and delivery order is
//! preserved.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use forks_pty::OutputSink;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

/// Mirror of the WebSocket payload cap.
pub const MAX_PAYLOAD: usize = forks_wire::MAX_FRAME_LEN;

/// Queue depth at which the connection is considered paused.
pub const PAUSE_AT: usize = 2 * MAX_PAYLOAD;

/// Depth below which a paused connection resumes.
pub const RESUME_AT: usize = MAX_PAYLOAD;

/// Sending half of one connection.
pub struct Outbound {
    tx: mpsc::UnboundedSender<Message>,
    queued: AtomicUsize,
    paused: AtomicBool,
    dropped: AtomicU64,
}

impl Outbound {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                tx,
                queued: AtomicUsize::new(0),
                paused: AtomicBool::new(false),
                dropped: AtomicU64::new(0),
            }),
            rx,
        )
    }

    /// Queue a serialized frame. Droppable frames are discarded while the
    /// connection is paused; returns whether the frame was queued.
    pub fn enqueue_text(&self, text: &str, droppable: bool) -> bool {
        if droppable && self.is_paused() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        self.queued.fetch_add(text.len(), Ordering::SeqCst);
        self.update_pause();
        if self.tx.send(Message::Text(text.to_string().into())).is_err() {
            self.queued.fetch_sub(text.len(), Ordering::SeqCst);
            return false;
        }
        true
    }

    /// Queue a control message (ping/close); never dropped, counts no
    /// bytes.
    pub fn enqueue_control(&self, message: Message) -> bool {
        self.tx.send(message).is_ok()
    }

    /// Called by the writer task once a message left the socket.
    pub fn mark_sent(&self, len: usize) {
        self.queued.fetch_sub(len, Ordering::SeqCst);
        self.update_pause();
    }

    pub fn buffered_bytes(&self) -> usize {
        self.queued.load(Ordering::SeqCst)
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn dropped_frames(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Hysteresis: pause above the high watermark, resume only once the
    /// queue has drained below the low one.
    fn update_pause(&self) {
        let queued = self.queued.load(Ordering::SeqCst);
        if queued > PAUSE_AT {
            self.paused.store(true, Ordering::SeqCst);
        } else if queued < RESUME_AT {
            self.paused.store(false, Ordering::SeqCst);
        }
    }
}

/// The PTY-facing view of a connection.
pub struct ConnectionSink {
    outbound: Arc<Outbound>,
}

impl ConnectionSink {
    pub fn new(outbound: Arc<Outbound>) -> Arc<Self> {
        Arc::new(Self { outbound })
    }
}

impl OutputSink for ConnectionSink {
    fn buffered_bytes(&self) -> usize {
        self.outbound.buffered_bytes()
    }

    fn send_frame(&self, frame: Arc<str>) {
        // The PTY manager already applied its own skip policy; whatever
        // reaches the sink must be delivered in order.
        self.outbound.enqueue_text(&frame, false);
    }
}

#[cfg(test)]
#[path = "connection_tests.rs"]
mod tests;
