// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pre-upgrade checks: origin allowlist, auth token extraction and
//! constant-time comparison, subprotocol selection.

/// Why an upgrade was refused, mapped to an HTTP status by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthRejection {
    /// Origin not on the allowlist (403).
    ForbiddenOrigin,
    /// Token wrong (401).
    Unauthorized,
    /// Auth is configured but the client sent no token (500).
    AuthNotConfigured,
    /// Connection cap reached (503).
    TooManyConnections,
}

/// Origins accepted by default: local dev servers and the packaged
/// desktop shell (`file://` pages send the literal string "file://" or
/// "null").
pub fn origin_allowed(origin: Option<&str>, extra: &[String]) -> bool {
    let Some(origin) = origin else {
        // Non-browser clients (CLIs, native shells) send no Origin.
        return true;
    };
    let origin = origin.trim_end_matches('/');
    if origin == "file://" || origin == "null" {
        return true;
    }
    if let Some(rest) = origin.strip_prefix("http://").or_else(|| origin.strip_prefix("https://"))
    {
        let host = rest.split(':').next().unwrap_or(rest);
        if host == "localhost" || host == "127.0.0.1" || host == "[::1]" {
            return true;
        }
    }
    extra.iter().any(|allowed| allowed == origin)
}

/// Pull the client token out of the supported carriers, in precedence
/// order: `Authorization: Bearer`, `X-Forksd-Token`, then a `token.*`
/// entry in `Sec-WebSocket-Protocol`.
pub fn extract_token(
    authorization: Option<&str>,
    forksd_token: Option<&str>,
    protocols: Option<&str>,
) -> Option<String> {
    if let Some(auth) = authorization {
        if let Some(bearer) = auth.strip_prefix("Bearer ") {
            let bearer = bearer.trim();
            if !bearer.is_empty() {
                return Some(bearer.to_string());
            }
        }
    }
    if let Some(token) = forksd_token {
        let token = token.trim();
        if !token.is_empty() {
            return Some(token.to_string());
        }
    }
    protocols
        .into_iter()
        .flat_map(|p| p.split(','))
        .map(str::trim)
        .find_map(|entry| entry.strip_prefix("token.").map(str::to_string))
}

/// Validate the client's token against the configured one.
pub fn check_token(configured: Option<&str>, provided: Option<&str>) -> Result<(), AuthRejection> {
    match (configured, provided) {
        (None, _) => Ok(()),
        (Some(_), None) => Err(AuthRejection::AuthNotConfigured),
        (Some(expected), Some(provided)) => {
            if constant_time_eq(expected.as_bytes(), provided.as_bytes()) {
                Ok(())
            } else {
                Err(AuthRejection::Unauthorized)
            }
        }
    }
}

/// Subprotocol selection: prefer `forksd`, else echo the client's
/// `token.*` entry so token-in-subprotocol clients complete the
/// handshake.
pub fn select_subprotocol(protocols: Option<&str>) -> Option<String> {
    let protocols = protocols?;
    let entries: Vec<&str> = protocols.split(',').map(str::trim).collect();
    if entries.contains(&"forksd") {
        return Some("forksd".to_string());
    }
    entries.iter().find(|e| e.starts_with("token.")).map(|e| e.to_string())
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
#[path = "auth_tests.rs"]
mod tests;
