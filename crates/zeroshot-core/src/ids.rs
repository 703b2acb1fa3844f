//! Branded ID newtypes for type safety.
//!
//! Cluster and agent identifiers are distinct newtype wrappers around
//! `String`, preventing a cluster id from being passed where an agent id is
//! expected. Cluster ids are generated as UUID v7 (time-ordered) with a
//! `cl_` prefix; agent ids come from configuration verbatim.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! branded_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create from an existing string value.
            #[must_use]
            pub fn from_string(s: String) -> Self {
                Self(s)
            }

            /// Return the inner string as a slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume self and return the inner `String`.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl std::ops::Deref for $name {
            type Target = str;
            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
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

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

branded_id! {
    /// Unique identifier for a cluster.
    ClusterId
}

branded_id! {
    /// Identifier for a configured agent within a cluster.
    AgentId
}

impl ClusterId {
    /// Generate a new time-ordered cluster id (`cl_` + UUID v7).
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("cl_{}", Uuid::now_v7()))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_has_prefix() {
        let id = ClusterId::generate();
        assert!(id.as_str().starts_with("cl_"));
    }

    #[test]
    fn generated_ids_are_unique() {
        assert_ne!(ClusterId::generate(), ClusterId::generate());
    }

    #[test]
    fn generated_ids_are_time_ordered() {
        // UUID v7 sorts lexicographically by creation time.
        let a = ClusterId::generate();
        let b = ClusterId::generate();
        assert!(a.as_str() <= b.as_str());
    }

    #[test]
    fn serde_transparent() {
        let id = AgentId::from("worker");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"worker\"");
        let back: AgentId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn display_and_deref() {
        let id = AgentId::from("validator");
        assert_eq!(id.to_string(), "validator");
        assert_eq!(&*id, "validator");
    }

    #[test]
    fn conversions() {
        let id: ClusterId = "cl_x".into();
        let s: String = id.clone().into();
        assert_eq!(s, "cl_x");
        assert_eq!(ClusterId::from_string("cl_x".into()), id);
    }
}
