// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Terminal session metadata: an owned PTY.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

crate::entity_id! {
    /// Unique identifier for a terminal session.
    pub struct TerminalId("trm-");
}

/// Who controls the session's lifecycle. Promoting an agent-owned session
/// to visible transfers ownership to the user; the agent loses kill
/// authority at that point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalOwner {
    User,
    Agent,
}

crate::display_as! {
    TerminalOwner {
        User => "user",
        Agent => "agent",
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TerminalSession {
    pub id: TerminalId,
    pub cwd: PathBuf,
    pub owner: TerminalOwner,
    pub visible: bool,
    pub created_at: DateTime<Utc>,
    pub command: Option<String>,
    pub exit_code: Option<i32>,
}
