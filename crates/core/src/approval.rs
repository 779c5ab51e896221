// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Approval record: a pending agent tool invocation awaiting user decision.
//!
//! The token is the only externally addressable handle for an approval; it
//! is bound to exactly one approval row for its entire lifetime and a
//! non-pending row can never be re-resolved.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::chat::ChatId;
use crate::token::ApprovalToken;

crate::entity_id! {
    /// Unique identifier for an approval row.
    pub struct ApprovalId("apv-");
}

/// What kind of side effect the agent is asking to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ApprovalType {
    CommandExecution,
    FileChange,
}

crate::display_as! {
    ApprovalType {
        CommandExecution => "command_execution",
        FileChange => "file_change",
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    #[default]
    Pending,
    Accepted,
    Declined,
    Cancelled,
}

impl ApprovalStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ApprovalStatus::Pending)
    }
}

crate::display_as! {
    ApprovalStatus {
        Pending => "pending",
        Accepted => "accepted",
        Declined => "declined",
        Cancelled => "cancelled",
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Approval {
    pub id: ApprovalId,
    pub chat_id: ChatId,
    pub token: ApprovalToken,
    pub approval_type: ApprovalType,
    pub thread_id: String,
    pub turn_id: String,
    pub item_id: String,
    pub command: Option<String>,
    pub cwd: Option<PathBuf>,
    pub reason: Option<String>,
    pub data: Option<serde_json::Value>,
    pub status: ApprovalStatus,
    pub created_at: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,
}

impl Approval {
    pub fn new(
        chat_id: ChatId,
        approval_type: ApprovalType,
        thread_id: impl Into<String>,
        turn_id: impl Into<String>,
        item_id: impl Into<String>,
    ) -> Self {
        Self {
            id: ApprovalId::new(),
            chat_id,
            token: ApprovalToken::generate(),
            approval_type,
            thread_id: thread_id.into(),
            turn_id: turn_id.into(),
            item_id: item_id.into(),
            command: None,
            cwd: None,
            reason: None,
            data: None,
            status: ApprovalStatus::Pending,
            created_at: Utc::now(),
            responded_at: None,
        }
    }
}
