// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-thread buffers for streamed adapter output.
//!
//! Deltas arrive as many small chunks; joining on every append would be
//! O(n²), so chunks are kept in a list with a separately tracked total and
//! joined once on turn completion. The bound is checked before append:
//! over-cap deltas are dropped whole (the full history is still in the
//! store).

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::{MAX_ACCUMULATED_LEN, MAX_DIFF_LEN};

/// Marker appended when a diff exceeds [`MAX_DIFF_LEN`].
pub const DIFF_TRUNCATED_MARKER: &str = "\n[DIFF TRUNCATED]";

#[derive(Default)]
struct ThreadBuffers {
    chunks: Vec<String>,
    total: usize,
    diff: Option<String>,
}

/// Message and diff accumulation for every live thread.
#[derive(Default)]
pub struct Accumulator {
    threads: Mutex<HashMap<String, ThreadBuffers>>,
}

impl Accumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a thread. Idempotent.
    pub fn init(&self, thread_id: &str) {
        self.threads.lock().entry(thread_id.to_string()).or_default();
    }

    /// Append a delta. Returns false when the thread is unknown or the cap
    /// would be exceeded (the delta is dropped).
    pub fn append(&self, thread_id: &str, delta: &str) -> bool {
        let mut threads = self.threads.lock();
        let Some(buffers) = threads.get_mut(thread_id) else {
            return false;
        };
        if buffers.total + delta.len() > MAX_ACCUMULATED_LEN {
            tracing::warn!(
                thread_id,
                accumulated = buffers.total,
                delta_len = delta.len(),
                "message accumulator over cap; dropping delta"
            );
            return false;
        }
        buffers.total += delta.len();
        buffers.chunks.push(delta.to_string());
        true
    }

    /// Replace the thread's diff buffer (last writer wins), truncating with
    /// a marker past the cap.
    pub fn set_diff(&self, thread_id: &str, diff: &str) {
        let mut threads = self.threads.lock();
        let Some(buffers) = threads.get_mut(thread_id) else {
            return;
        };
        buffers.diff = Some(if diff.len() > MAX_DIFF_LEN {
            let mut truncated = truncate_to_char_boundary(diff, MAX_DIFF_LEN).to_string();
            truncated.push_str(DIFF_TRUNCATED_MARKER);
            truncated
        } else {
            diff.to_string()
        });
    }

    /// Join the accumulated chunks; `None` when nothing was accumulated.
    pub fn joined(&self, thread_id: &str) -> Option<String> {
        let threads = self.threads.lock();
        let buffers = threads.get(thread_id)?;
        if buffers.chunks.is_empty() {
            None
        } else {
            Some(buffers.chunks.concat())
        }
    }

    pub fn diff(&self, thread_id: &str) -> Option<String> {
        self.threads.lock().get(thread_id)?.diff.clone()
    }

    pub fn total(&self, thread_id: &str) -> usize {
        self.threads.lock().get(thread_id).map(|b| b.total).unwrap_or(0)
    }

    /// Drop all state for a thread.
    pub fn remove(&self, thread_id: &str) {
        self.threads.lock().remove(thread_id);
    }

    pub fn clear(&self) {
        self.threads.lock().clear();
    }

    pub fn tracked_threads(&self) -> usize {
        self.threads.lock().len()
    }
}

/// Truncate to at most `max` bytes without splitting a UTF-8 sequence.
pub fn truncate_to_char_boundary(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

#[cfg(test)]
#[path = "accumulator_tests.rs"]
mod tests;
