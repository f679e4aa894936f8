//! Identifier types for the quota engine.
//!
//! All identifiers in the quota domain are opaque strings: user ids come
//! from the upstream auth gateway, request ids from the client, and wallet
//! ids from the document store. The `string_id_type!` macro reduces
//! boilerplate while keeping each id a distinct type at API seams.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Macro to define an opaque string identifier type with standard trait
/// implementations.
///
/// Generates a newtype wrapper around `String` with implementations for:
/// - `Clone`, `PartialEq`, `Eq`, `Hash`, `PartialOrd`, `Ord`
/// - `Serialize`, `Deserialize` (transparent)
/// - `Display`, `Debug`, `From<&str>`, `From<String>`, `AsRef<str>`
macro_rules! string_id_type {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create an identifier from any string-like value.
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// View the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Whether the identifier is the empty string.
            #[must_use]
            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

string_id_type!(
    UserId,
    "A user identifier.\n\nProvided by the upstream auth gateway; the quota engine treats it as opaque."
);
string_id_type!(
    WalletId,
    "A wallet identifier.\n\nAssigned by the document store when a wallet is opened (ULID, time-ordered)."
);
string_id_type!(
    RequestId,
    "A client-supplied request identifier.\n\nThe idempotency key for the reserve/commit/rollback protocol."
);
