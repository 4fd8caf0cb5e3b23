//! End-to-end scenarios tying writer, buffer, cache, reader and router
//! together, mirroring the literal inputs/outputs worked through by hand
//! alongside the module-level design.

use application_access::access_manager::AccessManager;
use application_access::error::AccessError;
use application_access::events::buffer::NoopPersister;
use application_access::events::{Action, EventBuffer, EventCache, EventPayload, FlushTrigger};
use application_access::external::{PersistentReader, SnapshotCursor};
use application_access::graph::EdgeStorage;
use application_access::hashing::{Crc32HashCodeGenerator, HashCodeGenerator};
use application_access::ids::{AccessLevelId, ComponentId, EntityId, EntityTypeId, GroupId, UserId};
use application_access::reader::ReaderNode;
use application_access::router::{ElementType, ShardBackend, ShardConfig, ShardGroup, ShardId, ShardRouter, ShardTopology};
use application_access::writer::WriterNode;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

#[test]
fn transitive_access() {
    let am = AccessManager::new_strict(EdgeStorage::Bidirectional);
    am.add_user(UserId::new("alice")).unwrap();
    am.add_group(GroupId::new("admins")).unwrap();
    am.add_group(GroupId::new("staff")).unwrap();
    am.add_user_to_group(UserId::new("alice"), GroupId::new("staff")).unwrap();
    am.add_group_to_group(GroupId::new("staff"), GroupId::new("admins")).unwrap();
    am.add_group_to_component_access(GroupId::new("admins"), (ComponentId::new("Orders"), AccessLevelId::new("View"))).unwrap();

    assert!(am.has_access_to_application_component(&UserId::new("alice"), &ComponentId::new("Orders"), &AccessLevelId::new("View")));
}

#[test]
fn cycle_rejection() {
    let am = AccessManager::new_strict(EdgeStorage::Bidirectional);
    am.add_group(GroupId::new("a")).unwrap();
    am.add_group(GroupId::new("b")).unwrap();
    am.add_group(GroupId::new("c")).unwrap();
    am.add_group_to_group(GroupId::new("a"), GroupId::new("b")).unwrap();
    am.add_group_to_group(GroupId::new("b"), GroupId::new("c")).unwrap();

    let err = am.add_group_to_group(GroupId::new("c"), GroupId::new("a"));
    assert!(matches!(err, Err(AccessError::WouldCreateCycle { .. })));
}

#[test]
fn cascading_removal() {
    let am = AccessManager::new_strict(EdgeStorage::Bidirectional);
    am.add_entity_type(EntityTypeId::new("ClientAccount")).unwrap();
    am.add_entity(EntityTypeId::new("ClientAccount"), EntityId::new("CompanyA")).unwrap();
    am.add_user(UserId::new("u")).unwrap();
    am.add_user_to_entity(UserId::new("u"), EntityTypeId::new("ClientAccount"), EntityId::new("CompanyA")).unwrap();

    am.remove_entity_type(&EntityTypeId::new("ClientAccount")).unwrap();

    let remaining = am.get_entities_accessible_by_user(&UserId::new("u"), None, false);
    assert!(remaining.is_empty());
}

/// Drives a write through `WriterNode`, flushes it into the shared
/// `EventCache`, and has a fresh `ReaderNode` (nil watermark) catch up
/// straight from the cache with no full reload involved.
#[tokio::test]
async fn reader_catches_up_from_the_cache_after_a_manual_flush() {
    let cache = Arc::new(EventCache::new(16));
    let writer_am = Arc::new(AccessManager::new_strict(EdgeStorage::Bidirectional));
    let buffer = Arc::new(EventBuffer::new(Default::default(), Arc::new(NoopPersister), cache.clone()));
    let writer = WriterNode::new(writer_am, buffer.clone(), Arc::new(Crc32HashCodeGenerator));

    writer.apply(Action::Add, EventPayload::User { u: UserId::new("u1") }).unwrap();
    writer.apply(Action::Add, EventPayload::Group { g: GroupId::new("g1") }).unwrap();
    writer.apply(Action::Add, EventPayload::UserToGroup { u: UserId::new("u1"), g: GroupId::new("g1") }).unwrap();
    buffer.flush(FlushTrigger::Manual).await.unwrap();

    let reader = ReaderNode::new(cache, Arc::new(NeverCalledPersistentReader), EdgeStorage::Bidirectional, false);
    reader.refresh().await.unwrap();

    assert!(!reader.latest_event_id().is_nil());
    let snapshot = reader.snapshot();
    assert!(snapshot.get_user_to_group_mappings(&UserId::new("u1"), false).contains(&GroupId::new("g1")));
}

/// Once the reader's watermark ages out of the cache window, refresh falls
/// back to a full reload from the persistent reader's snapshot.
#[tokio::test]
async fn reader_falls_back_to_full_reload_once_the_cache_ages_it_out() {
    let cache = Arc::new(EventCache::new(1));
    let writer_am = Arc::new(AccessManager::new_strict(EdgeStorage::Bidirectional));
    let buffer = Arc::new(EventBuffer::new(Default::default(), Arc::new(NoopPersister), cache.clone()));
    let writer = WriterNode::new(writer_am, buffer.clone(), Arc::new(Crc32HashCodeGenerator));

    writer.apply(Action::Add, EventPayload::User { u: UserId::new("u1") }).unwrap();
    buffer.flush(FlushTrigger::Manual).await.unwrap();

    let reader = ReaderNode::new(cache.clone(), Arc::new(FixedSnapshotReader), EdgeStorage::Bidirectional, false);
    reader.refresh().await.unwrap();
    let first_watermark = reader.latest_event_id();

    // Pushes u1's event out of the capacity-1 cache window.
    buffer.add_event(application_access::events::TemporalEvent::new(
        Action::Add,
        EventPayload::User { u: UserId::new("u2") },
        0,
        Utc::now(),
    ));
    buffer.flush(FlushTrigger::Manual).await.unwrap();

    reader.refresh().await.unwrap();
    assert_ne!(reader.latest_event_id(), first_watermark);

    let snapshot = reader.snapshot();
    assert!(snapshot.get_user_to_group_mappings(&UserId::new("from-snapshot"), false).is_empty());
    assert_eq!(snapshot.user_count(), 1);
}

/// Literal shard routing example: range starting at `i32::MIN` owns the
/// negative half of the hash space, range starting at `0` owns the rest.
#[tokio::test]
async fn shard_routing_sends_negative_and_non_negative_hashes_to_different_shards() {
    let config = ShardConfig::new(vec![
        ShardGroup { shard_id: ShardId(0), range_start: i32::MIN as u32, endpoint: "A".into() },
        ShardGroup { shard_id: ShardId(1), range_start: 0, endpoint: "B".into() },
    ]);

    let alice_shard = config.shard_for_hash(FixedHash::alice().hash_code("alice") as u32).unwrap();
    assert_eq!(alice_shard.endpoint, "A");

    let bob_shard = config.shard_for_hash(FixedHash::bob().hash_code("bob") as u32).unwrap();
    assert_eq!(bob_shard.endpoint, "B");

    let backend = Arc::new(TwoShardBackend::new());
    backend.shard(ShardId(0)).add_user(UserId::new("alice")).unwrap();
    backend.shard(ShardId(0)).add_group(GroupId::new("g")).unwrap();
    backend.shard(ShardId(0)).add_user_to_group(UserId::new("alice"), GroupId::new("g")).unwrap();
    backend.shard(ShardId(1)).add_user(UserId::new("bob")).unwrap();
    backend.shard(ShardId(1)).add_group(GroupId::new("g")).unwrap();
    backend.shard(ShardId(1)).add_user_to_group(UserId::new("bob"), GroupId::new("g")).unwrap();

    let topology = ShardTopology { user: config, group: ShardConfig::default(), group_to_group: ShardConfig::default() };
    let router = ShardRouter::new(topology, backend, Arc::new(FixedHash::alice()));
    let members = router.get_group_to_user_mappings(&GroupId::new("g"), false).await.unwrap();
    assert!(members.contains(&UserId::new("alice")));
    assert!(members.contains(&UserId::new("bob")));
}

struct NeverCalledPersistentReader;

#[async_trait]
impl PersistentReader for NeverCalledPersistentReader {
    async fn load(&self, _sink: &mut AccessManager) -> application_access::error::Result<SnapshotCursor> {
        panic!("a populated cache should make a full reload unnecessary");
    }
}

struct FixedSnapshotReader;

#[async_trait]
impl PersistentReader for FixedSnapshotReader {
    async fn load(&self, sink: &mut AccessManager) -> application_access::error::Result<SnapshotCursor> {
        sink.add_user(UserId::new("u2")).unwrap();
        Ok(SnapshotCursor { event_id: uuid::Uuid::new_v4(), timestamp: Utc::now() })
    }
}

/// A hash generator with two fixed outputs, standing in for the literal
/// `hash("alice") = -5`, `hash("bob") = 17` example.
struct FixedHash {
    alice: bool,
}

impl FixedHash {
    fn alice() -> Self {
        Self { alice: true }
    }
    fn bob() -> Self {
        Self { alice: false }
    }
}

impl HashCodeGenerator for FixedHash {
    fn hash_code(&self, input: &str) -> i32 {
        match input {
            "alice" => -5,
            "bob" => 17,
            _ => if self.alice { -5 } else { 17 },
        }
    }
}

struct TwoShardBackend {
    shards: dashmap::DashMap<ShardId, Arc<AccessManager>>,
}

impl TwoShardBackend {
    fn new() -> Self {
        let shards = dashmap::DashMap::new();
        shards.insert(ShardId(0), Arc::new(AccessManager::new_strict(EdgeStorage::Bidirectional)));
        shards.insert(ShardId(1), Arc::new(AccessManager::new_strict(EdgeStorage::Bidirectional)));
        Self { shards }
    }

    fn shard(&self, id: ShardId) -> Arc<AccessManager> {
        self.shards.get(&id).unwrap().clone()
    }
}

#[async_trait]
impl ShardBackend for TwoShardBackend {
    async fn access_manager(&self, _element: ElementType, shard_id: ShardId) -> application_access::error::Result<Arc<AccessManager>> {
        self.shards
            .get(&shard_id)
            .map(|e| e.clone())
            .ok_or_else(|| AccessError::not_found("Shard", format!("{shard_id:?}")))
    }
}
