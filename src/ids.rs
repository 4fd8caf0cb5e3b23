//! Typed identifiers for the six primary entity kinds (spec.md §3). Each is a
//! thin wrapper over `String` so the graph and access manager APIs cannot mix
//! up, say, a `GroupId` and a `ComponentId` at the call site even though both
//! are strings underneath.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! string_id {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                $name(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                $name(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                $name(s)
            }
        }
    };
}

string_id!(UserId, "A user (leaf vertex in the authorization graph).");
string_id!(GroupId, "A group (non-leaf vertex in the authorization graph).");
string_id!(EntityTypeId, "An entity type, scoping a set of entities.");
string_id!(EntityId, "An entity, scoped by an `EntityTypeId`.");
string_id!(ComponentId, "An application component.");
string_id!(AccessLevelId, "An access level on an application component or entity.");

/// `(component, access level)` pair — the payload of a user/group-to-component
/// mapping.
pub type ComponentAccess = (ComponentId, AccessLevelId);
