// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Prefixed entity identifiers.
//!
//! Every persisted entity gets a 23-byte id: a 4-character type prefix
//! (`cht-`, `att-`, …) followed by 19 characters of nanoid. Ids live
//! inline in a fixed buffer, so they are `Copy` and never allocate, and
//! they hash and borrow as their string form — maps keyed by an id type
//! can be probed with a plain `&str`.

/// Total id length: prefix plus random suffix.
pub const ID_LEN: usize = 23;

const PREFIX_LEN: usize = 4;
const SUFFIX_LEN: usize = ID_LEN - PREFIX_LEN;

/// Inline id storage. Always ASCII, at most [`ID_LEN`] bytes.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct IdBuf {
    len: u8,
    bytes: [u8; ID_LEN],
}

impl IdBuf {
    /// Mint `{prefix}{nanoid}` directly into the buffer; the result is
    /// exactly [`ID_LEN`] bytes.
    pub fn generate(prefix: &str) -> Self {
        debug_assert_eq!(prefix.len(), PREFIX_LEN, "id prefix must be 4 bytes: {prefix:?}");
        let mut bytes = [0u8; ID_LEN];
        let head = prefix.len().min(PREFIX_LEN);
        bytes[..head].copy_from_slice(&prefix.as_bytes()[..head]);
        let suffix = nanoid::nanoid!(SUFFIX_LEN);
        bytes[head..head + SUFFIX_LEN].copy_from_slice(suffix.as_bytes());
        Self { len: (head + SUFFIX_LEN) as u8, bytes }
    }

    /// Store an id that already exists (wire input, storage rows).
    /// Input past the inline capacity is truncated; generated ids always
    /// fit, so truncation only ever bites on malformed external data.
    pub fn store(s: &str) -> Self {
        let mut end = s.len().min(ID_LEN);
        // Never cut an id mid-codepoint.
        while end > 0 && !s.is_char_boundary(end) {
            end -= 1;
        }
        let mut bytes = [0u8; ID_LEN];
        bytes[..end].copy_from_slice(&s.as_bytes()[..end]);
        Self { len: end as u8, bytes }
    }

    pub fn as_str(&self) -> &str {
        // Both constructors copy from &str on a char boundary, so the
        // active bytes are always valid UTF-8.
        std::str::from_utf8(&self.bytes[..self.len as usize]).unwrap_or("")
    }
}

impl std::hash::Hash for IdBuf {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        // Hash only the active bytes so it matches str::hash,
        // which is required for Borrow<str> HashMap lookups.
        self.as_str().hash(state);
    }
}

impl std::borrow::Borrow<str> for IdBuf {
    fn borrow(&self) -> &str {
        self.as_str()
    }
}

impl std::fmt::Debug for IdBuf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self.as_str())
    }
}

impl std::fmt::Display for IdBuf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl serde::Serialize for IdBuf {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> serde::Deserialize<'de> for IdBuf {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        // Owned, not borrowed: ids also arrive through
        // `serde_json::from_value`, which cannot lend a `&str`.
        let s = String::deserialize(deserializer)?;
        if s.len() > ID_LEN {
            return Err(serde::de::Error::custom(format!("id exceeds {ID_LEN} bytes: {s:?}")));
        }
        Ok(IdBuf::store(&s))
    }
}

/// Define a newtype id with a 4-character type prefix.
///
/// The generated type carries exactly the surface the daemon uses:
/// `new()` to mint, `from_string()` to wrap external input, `as_str()` /
/// `suffix()`, `Display`, `AsRef<str>`, and `Borrow<str>` for map probes.
///
/// ```ignore
/// entity_id! {
///     /// Doc comment for the id type.
///     pub struct ChatId("cht-");
/// }
/// ```
#[macro_export]
macro_rules! entity_id {
    (
        $(#[$meta:meta])*
        pub struct $name:ident($prefix:literal);
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        #[serde(transparent)]
        pub struct $name($crate::id::IdBuf);

        impl $name {
            pub const PREFIX: &'static str = $prefix;

            /// Mint a fresh random id.
            pub fn new() -> Self {
                Self($crate::id::IdBuf::generate(Self::PREFIX))
            }

            /// Wrap an id that already exists.
            pub fn from_string(id: impl AsRef<str>) -> Self {
                Self($crate::id::IdBuf::store(id.as_ref()))
            }

            pub fn as_str(&self) -> &str {
                self.0.as_str()
            }

            /// The random part, without the type prefix.
            pub fn suffix(&self) -> &str {
                self.as_str().strip_prefix(Self::PREFIX).unwrap_or_else(|| self.as_str())
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                self.as_str()
            }
        }

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                self.as_str()
            }
        }
    };
}

#[cfg(test)]
#[path = "id_tests.rs"]
mod tests;
