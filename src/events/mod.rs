//! Event shapes shared by the writer, the buffer, the cache and readers
//! (spec.md §3 "Event shape"). Dynamic dispatch on event kind is avoided the
//! way DESIGN NOTES §9 asks: one tagged enum, one exhaustive match, instead
//! of a class hierarchy — mirrors the teacher's `EventEnvelope`/`Event`
//! split in `event_processing::sourcing`.

pub mod buffer;
pub mod cache;

pub use buffer::{EventBuffer, FlushTrigger};
pub use cache::EventCache;

use crate::error::Result;
use crate::ids::{ComponentAccess, EntityId, EntityTypeId, GroupId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// `Add` or `Remove`, the only two actions a mutation event can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    Add,
    Remove,
}

/// Fields common to every event (spec.md §3 "Header").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventHeader {
    pub event_id: Uuid,
    pub action: Action,
    pub occurred_time: DateTime<Utc>,
    pub hash_code: i32,
}

/// The ten payload kinds from spec.md §3, discriminated by a single enum
/// instead of a class per kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    User { u: UserId },
    Group { g: GroupId },
    UserToGroup { u: UserId, g: GroupId },
    GroupToGroup { from_g: GroupId, to_g: GroupId },
    UserToComponentAccess { u: UserId, c: ComponentAccess },
    GroupToComponentAccess { g: GroupId, c: ComponentAccess },
    EntityType { et: EntityTypeId },
    Entity { et: EntityTypeId, e: EntityId },
    UserToEntity { u: UserId, et: EntityTypeId, e: EntityId },
    GroupToEntity { g: GroupId, et: EntityTypeId, e: EntityId },
}

impl EventPayload {
    /// The element whose hash seeds `EventHeader::hash_code` (spec.md §3:
    /// "An event's hashCode equals the hash of its primary element").
    pub fn primary_element(&self) -> &str {
        match self {
            EventPayload::User { u } => u.as_str(),
            EventPayload::Group { g } => g.as_str(),
            EventPayload::UserToGroup { u, .. } => u.as_str(),
            EventPayload::GroupToGroup { from_g, .. } => from_g.as_str(),
            EventPayload::UserToComponentAccess { u, .. } => u.as_str(),
            EventPayload::GroupToComponentAccess { g, .. } => g.as_str(),
            EventPayload::EntityType { et } => et.as_str(),
            EventPayload::Entity { et, .. } => et.as_str(),
            EventPayload::UserToEntity { u, .. } => u.as_str(),
            EventPayload::GroupToEntity { g, .. } => g.as_str(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            EventPayload::User { .. } => "User",
            EventPayload::Group { .. } => "Group",
            EventPayload::UserToGroup { .. } => "UserToGroup",
            EventPayload::GroupToGroup { .. } => "GroupToGroup",
            EventPayload::UserToComponentAccess { .. } => "UserToComponentAccess",
            EventPayload::GroupToComponentAccess { .. } => "GroupToComponentAccess",
            EventPayload::EntityType { .. } => "EntityType",
            EventPayload::Entity { .. } => "Entity",
            EventPayload::UserToEntity { .. } => "UserToEntity",
            EventPayload::GroupToEntity { .. } => "GroupToEntity",
        }
    }
}

/// A full event: header plus payload, immutable and ordered once in the
/// cache (spec.md §3 "Lifecycle").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemporalEvent {
    pub header: EventHeader,
    pub payload: EventPayload,
}

impl TemporalEvent {
    pub fn new(action: Action, payload: EventPayload, hash_code: i32, occurred_time: DateTime<Utc>) -> Self {
        Self {
            header: EventHeader {
                event_id: Uuid::new_v4(),
                action,
                occurred_time,
                hash_code,
            },
            payload,
        }
    }

    pub fn id(&self) -> Uuid {
        self.header.event_id
    }
}

/// Injected into the Access Manager's writer-mode constructor so it can push
/// synthesized dependency-free prefix events without holding a back-reference
/// to the buffer (DESIGN NOTES §9 "Cyclic references between buffer and
/// access manager").
pub trait EventSink: Send + Sync {
    fn emit(&self, event: TemporalEvent) -> Result<()>;
}

/// Pluggable pre-mutation validation on the writer path (§4.E). The
/// null validator permits everything.
pub trait EventValidator: Send + Sync {
    fn validate(&self, payload: &EventPayload, action: Action) -> Result<()>;
}

pub struct NullValidator;

impl EventValidator for NullValidator {
    fn validate(&self, _payload: &EventPayload, _action: Action) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primary_element_of_user_to_group_is_the_user() {
        let payload = EventPayload::UserToGroup {
            u: UserId::new("alice"),
            g: GroupId::new("admins"),
        };
        assert_eq!(payload.primary_element(), "alice");
    }

    #[test]
    fn null_validator_permits_everything() {
        let v = NullValidator;
        let payload = EventPayload::User { u: UserId::new("x") };
        assert!(v.validate(&payload, Action::Add).is_ok());
    }
}
