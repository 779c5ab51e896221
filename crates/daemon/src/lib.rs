// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! forksd: the daemon binary's library surface.
//!
//! Wires the store, event bus, adapter, PTY manager, and engine together,
//! and serves the realtime WebSocket gateway.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod env;
pub mod gateway;
pub mod lifecycle;

pub use gateway::{Gateway, GatewayConfig};
pub use lifecycle::{Daemon, LifecycleError};
