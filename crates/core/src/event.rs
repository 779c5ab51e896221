// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Domain events carried on the `"agent"` channel.
//!
//! One tagged union covers every entity mutation the store and broker
//! publish. The wire envelope is `{"type": "<entity>", "event": "<verb>",
//! "<entity>": {...}}` so viewers can route on `type` without parsing the
//! payload.

use serde::{Deserialize, Serialize};

use crate::approval::Approval;
use crate::attempt::Attempt;
use crate::chat::{Chat, ChatId};
use crate::plan::Plan;
use crate::question::Question;
use crate::subagent::Subagent;
use crate::task::Task;
use crate::terminal::TerminalSession;

/// What happened to the entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventVerb {
    Created,
    Updated,
    Deleted,
    Requested,
    Accepted,
    Declined,
    Cancelled,
}

crate::display_as! {
    EventVerb {
        Created => "created",
        Updated => "updated",
        Deleted => "deleted",
        Requested => "requested",
        Accepted => "accepted",
        Declined => "declined",
        Cancelled => "cancelled",
    }
}

/// A domain event: entity tag + verb + the entity snapshot after the
/// mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    Chat {
        event: EventVerb,
        chat: Chat,
    },

    Attempt {
        event: EventVerb,
        attempt: Attempt,
    },

    /// Batch transition of sibling attempts (pick/discard in one step).
    AttemptBatch {
        event: EventVerb,
        #[serde(rename = "chatId")]
        chat_id: ChatId,
        attempts: Vec<Attempt>,
    },

    Subagent {
        event: EventVerb,
        subagent: Subagent,
    },

    Task {
        event: EventVerb,
        task: Task,
    },

    Plan {
        event: EventVerb,
        plan: Plan,
    },

    Question {
        event: EventVerb,
        question: Question,
    },

    Terminal {
        event: EventVerb,
        terminal: TerminalSession,
    },

    Approval {
        event: EventVerb,
        approval: Approval,
    },

    /// Stacked-diff tooling notifications. The payload is opaque to the
    /// core; the CLI integration that produces it is an external
    /// collaborator.
    Graphite {
        event: EventVerb,
        data: serde_json::Value,
    },
}

impl DomainEvent {
    /// The entity tag, matching the serialized `type` field.
    pub fn entity(&self) -> &'static str {
        match self {
            DomainEvent::Chat { .. } => "chat",
            DomainEvent::Attempt { .. } => "attempt",
            DomainEvent::AttemptBatch { .. } => "attempt_batch",
            DomainEvent::Subagent { .. } => "subagent",
            DomainEvent::Task { .. } => "task",
            DomainEvent::Plan { .. } => "plan",
            DomainEvent::Question { .. } => "question",
            DomainEvent::Terminal { .. } => "terminal",
            DomainEvent::Approval { .. } => "approval",
            DomainEvent::Graphite { .. } => "graphite",
        }
    }

    pub fn verb(&self) -> EventVerb {
        match self {
            DomainEvent::Chat { event, .. }
            | DomainEvent::Attempt { event, .. }
            | DomainEvent::AttemptBatch { event, .. }
            | DomainEvent::Subagent { event, .. }
            | DomainEvent::Task { event, .. }
            | DomainEvent::Plan { event, .. }
            | DomainEvent::Question { event, .. }
            | DomainEvent::Terminal { event, .. }
            | DomainEvent::Approval { event, .. }
            | DomainEvent::Graphite { event, .. } => *event,
        }
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
