// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Plan record: an agent-proposed implementation plan awaiting user decision.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::chat::ChatId;
use crate::project::ProjectId;

crate::entity_id! {
    /// Unique identifier for a plan.
    pub struct PlanId("pln-");
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
    Cancelled,
}

crate::display_as! {
    PlanStatus {
        Pending => "pending",
        Approved => "approved",
        Rejected => "rejected",
        Cancelled => "cancelled",
    }
}

/// Approval requires at least one associated [`Task`](crate::task::Task);
/// the store checks that at respond time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    pub id: PlanId,
    pub project_id: ProjectId,
    pub chat_id: ChatId,
    pub agent_id: String,
    pub title: String,
    pub content: String,
    pub status: PlanStatus,
    pub feedback: Option<String>,
    pub responded_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Plan {
    pub fn new(
        project_id: ProjectId,
        chat_id: ChatId,
        agent_id: impl Into<String>,
        title: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: PlanId::new(),
            project_id,
            chat_id,
            agent_id: agent_id.into(),
            title: title.into(),
            content: content.into(),
            status: PlanStatus::Pending,
            feedback: None,
            responded_at: None,
            created_at: Utc::now(),
        }
    }
}
