// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! forks-core: domain types for the forks orchestration daemon.
//!
//! Everything the other crates share lives here: prefixed nanoid
//! identifiers, the persisted entity records, the domain event union
//! carried on the `"agent"` channel, the in-process event bus, the
//! approval token, and the error taxonomy.

pub mod macros;

pub mod approval;
pub mod attempt;
pub mod bus;
pub mod chat;
pub mod error;
pub mod event;
pub mod id;
pub mod plan;
pub mod project;
pub mod question;
pub mod subagent;
pub mod task;
pub mod terminal;
pub mod token;
pub mod workspace;

pub use approval::{Approval, ApprovalId, ApprovalStatus, ApprovalType};
pub use attempt::{Attempt, AttemptId, AttemptStatus};
pub use bus::{EventBus, Subscription};
pub use chat::{Chat, ChatId, ChatStatus, CollaborationMode};
pub use error::{sanitize_message, ErrorKind};
pub use event::{DomainEvent, EventVerb};
pub use plan::{Plan, PlanId, PlanStatus};
pub use project::{Project, ProjectId};
pub use question::{Question, QuestionId, QuestionStatus};
pub use subagent::{Subagent, SubagentId, SubagentStatus, SubagentStatusCounts};
pub use task::{Task, TaskId, TaskStatus};
pub use terminal::{TerminalId, TerminalOwner, TerminalSession};
pub use token::{ApprovalToken, TOKEN_LEN};
pub use workspace::{Workspace, WorkspaceId, WorkspaceStatus};
