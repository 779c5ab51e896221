// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Frames clients send to the daemon.

use forks_core::TerminalId;
use serde::{Deserialize, Serialize};

/// User decision on a pending approval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ApprovalDecision {
    Accept,
    /// Accept and remember `(type, command, cwd)` for the rest of the
    /// process — identical requests are auto-accepted.
    AcceptForSession,
    Decline,
}

forks_core::display_as! {
    ApprovalDecision {
        Accept => "accept",
        AcceptForSession => "acceptForSession",
        Decline => "decline",
    }
}

impl ApprovalDecision {
    /// Whether the adapter should be told `accept`.
    pub fn is_accept(&self) -> bool {
        matches!(self, ApprovalDecision::Accept | ApprovalDecision::AcceptForSession)
    }
}

/// Inbound client frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientFrame {
    #[serde(rename = "ping")]
    Ping,

    #[serde(rename = "pty:attach")]
    PtyAttach { id: TerminalId },

    #[serde(rename = "pty:detach")]
    PtyDetach { id: TerminalId },

    #[serde(rename = "pty:input")]
    PtyInput { id: TerminalId, data: String },

    #[serde(rename = "pty:resize")]
    PtyResize { id: TerminalId, cols: u16, rows: u16 },
}
