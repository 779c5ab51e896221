// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task record: a coordination work item claimed and resolved by agents.
//!
//! Ownership transitions are atomic in the store: claim only if pending;
//! complete/fail/unclaim only by the claimant. A pending task that carries
//! `result` or `unclaim_reason` was unclaimed before — the leftover text is
//! handoff context for the next claimant.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::chat::ChatId;
use crate::plan::PlanId;

crate::entity_id! {
    /// Unique identifier for a task.
    pub struct TaskId("tsk-");
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    Claimed,
    Completed,
    Failed,
}

crate::display_as! {
    TaskStatus {
        Pending => "pending",
        Claimed => "claimed",
        Completed => "completed",
        Failed => "failed",
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: TaskId,
    pub chat_id: ChatId,
    pub plan_id: Option<PlanId>,
    pub description: String,
    /// Non-null iff status ∈ {claimed, completed, failed}.
    pub claimed_by: Option<String>,
    pub status: TaskStatus,
    pub result: Option<String>,
    pub unclaim_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub fn new(chat_id: ChatId, description: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: TaskId::new(),
            chat_id,
            plan_id: None,
            description: description.into(),
            claimed_by: None,
            status: TaskStatus::Pending,
            result: None,
            unclaim_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn for_plan(chat_id: ChatId, plan_id: PlanId, description: impl Into<String>) -> Self {
        let mut task = Self::new(chat_id, description);
        task.plan_id = Some(plan_id);
        task
    }
}
