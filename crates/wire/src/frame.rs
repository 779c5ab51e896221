// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Frame limits and JSON encode/decode helpers.

use thiserror::Error;

use crate::client::ClientFrame;
use crate::server::ServerFrame;

/// Maximum inbound or outbound frame size.
pub const MAX_FRAME_LEN: usize = 64 * 1024;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("frame exceeds {MAX_FRAME_LEN} bytes ({0} bytes)")]
    TooLarge(usize),

    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Parse an inbound client frame, enforcing the size cap before parsing.
pub fn decode_client(payload: &[u8]) -> Result<ClientFrame, FrameError> {
    if payload.len() > MAX_FRAME_LEN {
        return Err(FrameError::TooLarge(payload.len()));
    }
    Ok(serde_json::from_slice(payload)?)
}

/// Serialize an outbound frame once; the caller fans the string out to
/// every subscriber.
pub fn encode_server(frame: &ServerFrame) -> Result<String, FrameError> {
    Ok(serde_json::to_string(frame)?)
}

#[cfg(test)]
#[path = "frame_tests.rs"]
mod tests;
