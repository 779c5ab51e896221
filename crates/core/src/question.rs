// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Question record: a single-shot question to the user.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::chat::ChatId;

crate::entity_id! {
    /// Unique identifier for a question.
    pub struct QuestionId("qst-");
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionStatus {
    #[default]
    Pending,
    Answered,
    Cancelled,
}

crate::display_as! {
    QuestionStatus {
        Pending => "pending",
        Answered => "answered",
        Cancelled => "cancelled",
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: QuestionId,
    pub chat_id: ChatId,
    pub agent_id: String,
    pub content: String,
    pub answer: Option<String>,
    pub status: QuestionStatus,
    pub created_at: DateTime<Utc>,
}

impl Question {
    pub fn new(chat_id: ChatId, agent_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: QuestionId::new(),
            chat_id,
            agent_id: agent_id.into(),
            content: content.into(),
            answer: None,
            status: QuestionStatus::Pending,
            created_at: Utc::now(),
        }
    }
}
