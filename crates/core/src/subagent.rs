// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Subagent record: a spawned streamed task under a chat.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::attempt::AttemptId;
use crate::chat::ChatId;

crate::entity_id! {
    /// Unique identifier for a subagent.
    pub struct SubagentId("sub-");
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubagentStatus {
    #[default]
    Running,
    Completed,
    Cancelled,
    Failed,
    Interrupted,
}

crate::display_as! {
    SubagentStatus {
        Running => "running",
        Completed => "completed",
        Cancelled => "cancelled",
        Failed => "failed",
        Interrupted => "interrupted",
    }
}

/// A streamed, non-isolated task executed under a chat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subagent {
    pub id: SubagentId,
    pub parent_chat_id: ChatId,
    pub parent_attempt_id: Option<AttemptId>,
    pub task: String,
    pub status: SubagentStatus,
    pub result: Option<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Subagent {
    pub fn new(parent_chat_id: ChatId, task: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: SubagentId::new(),
            parent_chat_id,
            parent_attempt_id: None,
            task: task.into(),
            status: SubagentStatus::Running,
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Aggregate status counts for the subagents of one chat.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubagentStatusCounts {
    pub running: usize,
    pub completed: usize,
    pub cancelled: usize,
    pub failed: usize,
    pub interrupted: usize,
}

impl SubagentStatusCounts {
    pub fn total(&self) -> usize {
        self.running + self.completed + self.cancelled + self.failed + self.interrupted
    }

    pub fn record(&mut self, status: SubagentStatus) {
        match status {
            SubagentStatus::Running => self.running += 1,
            SubagentStatus::Completed => self.completed += 1,
            SubagentStatus::Cancelled => self.cancelled += 1,
            SubagentStatus::Failed => self.failed += 1,
            SubagentStatus::Interrupted => self.interrupted += 1,
        }
    }
}
