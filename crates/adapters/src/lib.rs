// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! forks-adapters: the boundary to the downstream AI-process adapter.
//!
//! The adapter is an external collaborator with a fixed contract: it owns
//! threads and runs, streams events, and raises approval requests. This
//! crate defines that contract as a trait plus the event types, and ships
//! a recording fake for tests behind the `test-support` feature.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod agent;
mod handlers;
mod remote;
pub mod subprocess;

#[cfg(any(test, feature = "test-support"))]
mod fake;

pub use agent::{
    AdapterDecision, AdapterError, AdapterEvent, AgentAdapter, ApprovalParams, ApprovalRequest,
    ForkOptions, ThreadHandle, TurnOptions,
};
pub use handlers::{HandlerSet, HandlerSubscription};
pub use remote::RemoteAgentAdapter;

#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeAgentAdapter, RecordedTurn};
