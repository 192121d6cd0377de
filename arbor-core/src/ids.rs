//! Type-safe ID newtypes
//!
//! Turn and message ids are server-assigned integers. They are ordered because
//! the lock policy compares the viewing turn against the current turn.
//! Context and model ids are opaque strings.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Macro to define an ordered, server-assigned integer ID
macro_rules! define_numeric_id {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(
            Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            pub const fn new(value: i64) -> Self {
                Self(value)
            }

            /// Get the inner integer value
            pub const fn get(self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> i64 {
                id.0
            }
        }

        impl FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim().parse::<i64>().map(Self)
            }
        }
    };
}

/// Macro to define an opaque string ID
macro_rules! define_key {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn into_string(self) -> String {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

define_numeric_id!(TurnId, "Unique identifier for a turn (tree node) within one context");
define_numeric_id!(MessageId, "Unique identifier for a message");

define_key!(ContextId, "Identifier for a conversational context (one page, one shared tree)");
define_key!(ModelId, "Identifier for the model that owns a viewport");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_turn_ids_order_numerically() {
        assert!(TurnId::new(2) < TurnId::new(3));
        assert!(TurnId::new(10) > TurnId::new(9));
    }

    #[test]
    fn test_turn_id_parse() {
        assert_eq!(" 42 ".parse::<TurnId>().unwrap(), TurnId::new(42));
        assert!("abc".parse::<TurnId>().is_err());
    }

    #[test]
    fn test_key_display() {
        let id = ModelId::new("claude");
        assert_eq!(format!("{}", id), "claude");
        assert_eq!(id.as_str(), "claude");
    }

    #[test]
    fn test_id_serde_is_transparent() {
        let id = MessageId::new(7);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "7");

        let ctx: ContextId = serde_json::from_str("\"page-1\"").unwrap();
        assert_eq!(ctx, ContextId::from("page-1"));
    }
}
