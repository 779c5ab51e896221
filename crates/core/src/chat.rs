// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Chat record: a persisted agent conversation bound to a workspace.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::workspace::WorkspaceId;

crate::entity_id! {
    /// Unique identifier for a chat.
    pub struct ChatId("cht-");
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatStatus {
    #[default]
    Active,
    Archived,
}

crate::display_as! {
    ChatStatus {
        Active => "active",
        Archived => "archived",
    }
}

/// How the agent collaborates on this chat: propose a plan first, or
/// execute directly. `None` means the default free-form conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollaborationMode {
    Plan,
    Execute,
}

crate::display_as! {
    CollaborationMode {
        Plan => "plan",
        Execute => "execute",
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    pub id: ChatId,
    pub workspace_id: WorkspaceId,
    /// Adapter-side conversation handle, set once the first thread starts.
    pub adapter_thread_id: Option<String>,
    pub title: Option<String>,
    pub status: ChatStatus,
    pub collaboration_mode: Option<CollaborationMode>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Chat {
    pub fn new(workspace_id: WorkspaceId) -> Self {
        let now = Utc::now();
        Self {
            id: ChatId::new(),
            workspace_id,
            adapter_thread_id: None,
            title: None,
            status: ChatStatus::Active,
            collaboration_mode: None,
            created_at: now,
            updated_at: now,
        }
    }
}
