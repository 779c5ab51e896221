// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error taxonomy shared across the daemon.
//!
//! Every externally visible failure maps to one of these kinds; the short
//! snake_case code is what clients see. Anything that does not fit is
//! `Internal` — logged in full, never echoed verbatim.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ErrorKind {
    /// Entity lookup miss.
    #[error("not found")]
    NotFound,

    /// State-machine violation: the row was not pending.
    #[error("not pending")]
    NotPending,

    /// State-machine violation: the task was not claimed by the caller.
    #[error("not claimed")]
    NotClaimed,

    /// Lost race: already picked, already claimed, unique violation.
    #[error("conflict")]
    Conflict,

    #[error("invalid id: {0}")]
    InvalidId(String),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("invalid branch: {0}")]
    InvalidBranch(String),

    #[error("invalid cwd: {0}")]
    InvalidCwd(String),

    #[error("invalid approval token")]
    InvalidApprovalToken,

    #[error("invalid origin")]
    InvalidOrigin,

    #[error("unauthorized")]
    Unauthorized,

    /// Clients presented a token but the daemon has none configured.
    #[error("auth not configured")]
    AuthNotConfigured,

    #[error("payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("approval declined")]
    ApprovalDeclined,

    #[error("approval cancelled")]
    ApprovalCancelled,

    #[error("approval timeout")]
    ApprovalTimeout,

    /// Admission limit hit (global or per-chat execution cap).
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    /// Anything else. Always logged; clients only ever see the code.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ErrorKind {
    /// The short code exposed to clients.
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::NotPending => "not_pending",
            ErrorKind::NotClaimed => "not_claimed",
            ErrorKind::Conflict => "conflict",
            ErrorKind::InvalidId(_) => "invalid_id",
            ErrorKind::InvalidPath(_) => "invalid_path",
            ErrorKind::InvalidBranch(_) => "invalid_branch",
            ErrorKind::InvalidCwd(_) => "invalid_cwd",
            ErrorKind::InvalidApprovalToken => "invalid_approval_token",
            ErrorKind::InvalidOrigin => "invalid_origin",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::AuthNotConfigured => "auth_not_configured",
            ErrorKind::PayloadTooLarge(_) => "payload_too_large",
            ErrorKind::ApprovalDeclined => "approval_declined",
            ErrorKind::ApprovalCancelled => "approval_cancelled",
            ErrorKind::ApprovalTimeout => "approval_timeout",
            ErrorKind::ResourceExhausted(_) => "resource_exhausted",
            ErrorKind::Internal(_) => "internal_error",
        }
    }
}

/// Maximum length of a detail string that may reach a client.
const MAX_CLIENT_MESSAGE: usize = 200;

/// Sanitize a message for external consumption.
///
/// Strings containing path separators or exceeding 200 characters collapse
/// to `internal_error`; control characters are stripped from the rest.
pub fn sanitize_message(message: &str) -> String {
    if message.len() > MAX_CLIENT_MESSAGE || message.contains('/') || message.contains('\\') {
        return "internal_error".to_string();
    }
    message.chars().filter(|c| !c.is_control()).collect()
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
