// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Attempt record: one branch of a poly-iteration over a chat.
//!
//! At most one attempt per chat may ever hold `Picked`; the store enforces
//! that atomically at pick time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::chat::ChatId;

crate::entity_id! {
    /// Unique identifier for an attempt.
    pub struct AttemptId("att-");
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    #[default]
    Running,
    Completed,
    Picked,
    Discarded,
}

impl AttemptStatus {
    /// Terminal states never transition again, except `Completed → Picked`
    /// and `Completed → Discarded` through the pick path.
    pub fn is_terminal(&self) -> bool {
        matches!(self, AttemptStatus::Picked | AttemptStatus::Discarded)
    }
}

crate::display_as! {
    AttemptStatus {
        Running => "running",
        Completed => "completed",
        Picked => "picked",
        Discarded => "discarded",
    }
}

/// One candidate solution under a chat, isolated in its own worktree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attempt {
    pub id: AttemptId,
    pub chat_id: ChatId,
    pub adapter_thread_id: Option<String>,
    pub worktree_path: Option<PathBuf>,
    pub branch: Option<String>,
    pub status: AttemptStatus,
    pub result: Option<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Attempt {
    pub fn new(chat_id: ChatId) -> Self {
        let now = Utc::now();
        Self {
            id: AttemptId::new(),
            chat_id,
            adapter_thread_id: None,
            worktree_path: None,
            branch: None,
            status: AttemptStatus::Running,
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }
}
