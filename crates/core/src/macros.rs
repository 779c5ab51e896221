// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Declarative macros shared across the workspace.

/// Implement `Display` for a fieldless status enum by mapping each
/// variant to its wire label.
///
/// Every status enum in this codebase is a plain set of unit variants
/// whose display form matches the serialized label, so the macro only
/// supports that shape — a data-carrying variant is a compile error.
///
/// ```ignore
/// crate::display_as! {
///     AttemptStatus {
///         Running => "running",
///         Picked => "picked",
///     }
/// }
/// ```
#[macro_export]
macro_rules! display_as {
    ($ty:ty { $( $variant:ident => $label:literal ),+ $(,)? }) => {
        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                let label = match self {
                    $( Self::$variant => $label, )+
                };
                f.write_str(label)
            }
        }
    };
}
