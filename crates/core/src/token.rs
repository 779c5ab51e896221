// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Approval token: the only externally addressable handle of an approval.
//!
//! 32 bytes of CSPRNG output, base64url-encoded without padding — exactly
//! 43 characters. Comparison at the auth boundary goes through
//! [`ApprovalToken::matches`], which never short-circuits, so token
//! prefixes cannot leak through timing.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;
use serde::{Deserialize, Serialize};

/// Encoded token length: ceil(32 * 4 / 3) with no padding.
pub const TOKEN_LEN: usize = 43;

const TOKEN_BYTES: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApprovalToken(String);

impl ApprovalToken {
    /// Generate a fresh random token from the OS CSPRNG.
    pub fn generate() -> Self {
        let mut bytes = [0u8; TOKEN_BYTES];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self(URL_SAFE_NO_PAD.encode(bytes))
    }

    /// Accept an externally supplied token string, validating its shape.
    pub fn parse(s: &str) -> Result<Self, crate::error::ErrorKind> {
        if Self::is_valid_shape(s) {
            Ok(Self(s.to_string()))
        } else {
            Err(crate::error::ErrorKind::InvalidApprovalToken)
        }
    }

    /// Shape check for the HTTP boundary: length exactly 43, base64url
    /// charset. Rejecting malformed tokens before any lookup keeps the
    /// constant-time comparison confined to well-formed candidates.
    pub fn is_valid_shape(s: &str) -> bool {
        s.len() == TOKEN_LEN
            && s.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Constant-time equality against a candidate string.
    pub fn matches(&self, candidate: &str) -> bool {
        constant_time_eq(self.0.as_bytes(), candidate.as_bytes())
    }
}

impl std::fmt::Display for ApprovalToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Constant-time equality check to prevent timing attacks.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }

    result == 0
}

#[cfg(test)]
#[path = "token_tests.rs"]
mod tests;
