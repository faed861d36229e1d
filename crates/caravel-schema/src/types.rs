//! Newtype wrappers for string identifiers, providing compile-time type safety.
//!
//! All newtypes serialize/deserialize as plain strings.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Deref;

macro_rules! string_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new instance from a string.
            pub fn new(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            /// Return the inner string as a slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume self and return the inner `String`.
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl Deref for $name {
            type Target = str;
            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl PartialEq<str> for $name {
            fn eq(&self, other: &str) -> bool {
                self.0 == other
            }
        }

        impl PartialEq<&str> for $name {
            fn eq(&self, other: &&str) -> bool {
                self.0 == *other
            }
        }

        impl PartialEq<String> for $name {
            fn eq(&self, other: &String) -> bool {
                self.0 == *other
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }
    };
}

string_newtype! {
    /// Full deterministic environment identifier (64 hex chars).
    EnvId
}

string_newtype! {
    /// Abbreviated environment identifier (first 12 hex chars of the `EnvId`).
    ShortId
}

string_newtype! {
    /// blake3 content digest in lowercase hex (64 chars).
    Checksum
}

/// Returns `true` if `s` is a well-formed lowercase blake3 hex digest.
pub fn is_hex_digest(s: &str) -> bool {
    s.len() == 64 && s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newtype_roundtrips_through_serde() {
        let id = EnvId::new("abc123");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"abc123\"");
        let back: EnvId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn newtype_compares_with_str() {
        let short = ShortId::new("deadbeef0123");
        assert_eq!(short, "deadbeef0123");
        assert_eq!(short.as_str(), "deadbeef0123");
    }

    #[test]
    fn hex_digest_accepts_valid() {
        let digest = blake3::hash(b"anything").to_hex().to_string();
        assert!(is_hex_digest(&digest));
    }

    #[test]
    fn hex_digest_rejects_wrong_length() {
        assert!(!is_hex_digest("abc123"));
        assert!(!is_hex_digest(&"a".repeat(63)));
        assert!(!is_hex_digest(&"a".repeat(65)));
    }

    #[test]
    fn hex_digest_rejects_uppercase_and_nonhex() {
        assert!(!is_hex_digest(&"A".repeat(64)));
        assert!(!is_hex_digest(&"g".repeat(64)));
        assert!(!is_hex_digest(&"-".repeat(64)));
    }
}
