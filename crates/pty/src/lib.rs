// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! forks-pty: terminal session ownership for the daemon.
//!
//! Each session wraps an OS PTY with a ring-buffered history and a
//! coalescing output batcher. Subscribers (WebSocket connections) attach
//! through the manager; a slow subscriber is skipped for output frames but
//! always receives exit frames. Agent-owned invisible sessions are reaped
//! after five minutes of silence.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod env;
mod manager;
mod session;

pub use manager::{OutputSink, PtyManager, RegisterOptions, SubscriberKey};
pub use session::{spawn_shell, PtyError, PtyEvent, SessionIo};

use std::time::Duration;

/// Largest single write accepted into a PTY.
pub const MAX_WRITE_LEN: usize = 64 * 1024;

/// Terminal dimension bounds.
pub const COLS_RANGE: std::ops::RangeInclusive<u16> = 1..=500;
pub const ROWS_RANGE: std::ops::RangeInclusive<u16> = 1..=200;

/// Output history retained per session.
pub const HISTORY_MAX: usize = 1024 * 1024;

/// Batcher flush thresholds: whichever of size/delay trips first.
pub const BATCH_MAX: usize = 8 * 1024;
pub const BATCH_DELAY: Duration = Duration::from_millis(16);

/// A subscriber whose outbound buffer exceeds this is under backpressure.
pub const BACKPRESSURE_LIMIT: usize = 64 * 1024;

/// Idle reap deadline for agent-owned, non-visible sessions.
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Grace between the polite shutdown request and the hard kill.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);
