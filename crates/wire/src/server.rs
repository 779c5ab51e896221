// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Frames the daemon sends to clients.

use forks_core::{DomainEvent, TerminalId};
use serde::{Deserialize, Serialize};

/// Outbound server frame. One JSON envelope per WebSocket message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerFrame {
    /// Domain event from the store/broker.
    #[serde(rename = "agent")]
    Agent { event: DomainEvent },

    /// Raw adapter event (deltas, turn lifecycle). The payload is the
    /// adapter's own JSON; the daemon does not interpret it.
    #[serde(rename = "adapter")]
    Adapter { event: serde_json::Value },

    #[serde(rename = "pong")]
    Pong,

    #[serde(rename = "pty:attached")]
    PtyAttached {
        id: TerminalId,
        /// Buffered history replayed on attach.
        history: String,
    },

    #[serde(rename = "pty:output")]
    PtyOutput { id: TerminalId, data: String },

    #[serde(rename = "pty:exit")]
    PtyExit {
        id: TerminalId,
        #[serde(rename = "exitCode")]
        exit_code: Option<i32>,
    },

    #[serde(rename = "pty:error")]
    PtyError { id: TerminalId, message: String },

    #[serde(rename = "error")]
    Error { code: String, message: String },
}

impl ServerFrame {
    /// Delta-class frames may be dropped for a paused (backpressured)
    /// connection; everything else must be delivered.
    pub fn droppable_under_backpressure(&self) -> bool {
        match self {
            ServerFrame::Adapter { event } => {
                let kind = event.get("type").and_then(|t| t.as_str()).unwrap_or("");
                kind.ends_with("/delta")
            }
            ServerFrame::PtyOutput { .. } => true,
            _ => false,
        }
    }
}
