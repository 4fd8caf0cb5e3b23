//! Aggregates the authorization graph with the three mapping stores and
//! answers access queries over them (§4.C). The mapping stores are
//! `DashMap`s — concurrency-safe containers readers can hit without taking
//! any of the named locks from [`crate::concurrency`], per §5: "readers
//! acquire no locks on pure lookups".

use crate::concurrency::{AcquirePattern, ConcurrencyWrapper, LockId};
use crate::error::{AccessError, Result};
use crate::events::{Action, EventPayload, EventSink, TemporalEvent};
use crate::graph::{DirectedGraph, EdgeStorage};
use crate::hashing::HashCodeGenerator;
use crate::ids::{AccessLevelId, ComponentAccess, ComponentId, EntityId, EntityTypeId, GroupId, UserId};
use chrono::Utc;
use dashmap::DashMap;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// State needed to synthesize dependency-free prefix events (§4.C
/// "DependencyFreeAccessManager"). Kept out of the public API; constructed
/// once and owned by the `AccessManager`.
struct DependencySynth {
    sink: Arc<dyn EventSink>,
    hash_gen: Arc<dyn HashCodeGenerator>,
}

impl DependencySynth {
    fn emit(&self, payload: EventPayload) -> Result<()> {
        let hash_code = self.hash_gen.hash_code(payload.primary_element());
        let event = TemporalEvent::new(Action::Add, payload, hash_code, Utc::now());
        self.sink.emit(event)
    }
}

enum WriteMode {
    Strict,
    DependencyFree(DependencySynth),
}

/// In-memory authorization graph plus user/group → (component, access level)
/// and user/group → entity-type → entity mappings (§3, §4.C).
pub struct AccessManager {
    mode: WriteMode,
    graph: ConcurrencyWrapper<UserId, GroupId>,
    user_to_component: DashMap<UserId, HashSet<ComponentAccess>>,
    group_to_component: DashMap<GroupId, HashSet<ComponentAccess>>,
    user_to_entity: DashMap<UserId, HashMap<EntityTypeId, HashSet<EntityId>>>,
    group_to_entity: DashMap<GroupId, HashMap<EntityTypeId, HashSet<EntityId>>>,
    entity_types: DashMap<EntityTypeId, HashSet<EntityId>>,
}

impl AccessManager {
    /// Strict mode: duplicate mutations and missing dependencies fail
    /// (`AlreadyExists` / `NotFound`). Used for readers and for writers that
    /// want hard referential integrity.
    pub fn new_strict(storage: EdgeStorage) -> Self {
        Self {
            mode: WriteMode::Strict,
            graph: ConcurrencyWrapper::new(DirectedGraph::new(storage), false),
            user_to_component: DashMap::new(),
            group_to_component: DashMap::new(),
            user_to_entity: DashMap::new(),
            group_to_entity: DashMap::new(),
            entity_types: DashMap::new(),
        }
    }

    /// Dependency-free mode: duplicate mutations are a no-op, and a mutation
    /// referring to a missing primary element synthesizes a prefix `Add`
    /// event for it (emitted through `sink`, strictly before the referring
    /// event the caller goes on to build) (§4.C, §9 "DESIGN NOTES").
    pub fn new_dependency_free(
        storage: EdgeStorage,
        sink: Arc<dyn EventSink>,
        hash_gen: Arc<dyn HashCodeGenerator>,
    ) -> Self {
        Self {
            mode: WriteMode::DependencyFree(DependencySynth { sink, hash_gen }),
            graph: ConcurrencyWrapper::new(DirectedGraph::new(storage), false),
            user_to_component: DashMap::new(),
            group_to_component: DashMap::new(),
            user_to_entity: DashMap::new(),
            group_to_entity: DashMap::new(),
            entity_types: DashMap::new(),
        }
    }

    fn is_dependency_free(&self) -> bool {
        matches!(self.mode, WriteMode::DependencyFree(_))
    }

    fn ensure_user(&self, u: &UserId) -> Result<()> {
        if self.graph.with_read(|g| g.contains_leaf(u)) {
            return Ok(());
        }
        match &self.mode {
            WriteMode::Strict => Err(AccessError::not_found("User", u.to_string())),
            WriteMode::DependencyFree(synth) => {
                self.graph.with_write(LockId::LeafVertices, AcquirePattern::ObjectAndDependencies, |g| {
                    g.add_leaf_vertex(u.clone());
                });
                synth.emit(EventPayload::User { u: u.clone() })
            }
        }
    }

    fn ensure_group(&self, g_id: &GroupId) -> Result<()> {
        if self.graph.with_read(|g| g.contains_non_leaf(g_id)) {
            return Ok(());
        }
        match &self.mode {
            WriteMode::Strict => Err(AccessError::not_found("Group", g_id.to_string())),
            WriteMode::DependencyFree(synth) => {
                self.graph.with_write(LockId::NonLeafVertices, AcquirePattern::ObjectAndDependencies, |g| {
                    g.add_non_leaf_vertex(g_id.clone());
                });
                synth.emit(EventPayload::Group { g: g_id.clone() })
            }
        }
    }

    fn ensure_entity_type(&self, et: &EntityTypeId) -> Result<()> {
        if self.entity_types.contains_key(et) {
            return Ok(());
        }
        match &self.mode {
            WriteMode::Strict => Err(AccessError::not_found("EntityType", et.to_string())),
            WriteMode::DependencyFree(synth) => {
                self.entity_types.insert(et.clone(), HashSet::new());
                synth.emit(EventPayload::EntityType { et: et.clone() })
            }
        }
    }

    fn ensure_entity(&self, et: &EntityTypeId, e: &EntityId) -> Result<()> {
        self.ensure_entity_type(et)?;
        let exists = self.entity_types.get(et).map(|s| s.contains(e)).unwrap_or(false);
        if exists {
            return Ok(());
        }
        match &self.mode {
            WriteMode::Strict => Err(AccessError::not_found("Entity", format!("{et}/{e}"))),
            WriteMode::DependencyFree(synth) => {
                self.entity_types.entry(et.clone()).or_default().insert(e.clone());
                synth.emit(EventPayload::Entity { et: et.clone(), e: e.clone() })
            }
        }
    }

    // --- Add / Remove: users and groups --------------------------------

    pub fn add_user(&self, u: UserId) -> Result<()> {
        let added = self.graph.with_write(LockId::LeafVertices, AcquirePattern::ObjectAndDependencies, |g| {
            g.add_leaf_vertex(u.clone())
        });
        if !added && !self.is_dependency_free() {
            return Err(AccessError::already_exists("User", u.to_string()));
        }
        Ok(())
    }

    pub fn remove_user(&self, u: &UserId) -> Result<()> {
        let removed = self.graph.with_write(LockId::LeafVertices, AcquirePattern::ObjectAndDependents, |g| {
            g.remove_leaf_vertex(u)
        });
        if !removed {
            return Err(AccessError::not_found("User", u.to_string()));
        }
        self.user_to_component.remove(u);
        self.user_to_entity.remove(u);
        Ok(())
    }

    pub fn add_group(&self, g: GroupId) -> Result<()> {
        let added = self.graph.with_write(LockId::NonLeafVertices, AcquirePattern::ObjectAndDependencies, |gr| {
            gr.add_non_leaf_vertex(g.clone())
        });
        if !added && !self.is_dependency_free() {
            return Err(AccessError::already_exists("Group", g.to_string()));
        }
        Ok(())
    }

    pub fn remove_group(&self, g: &GroupId) -> Result<()> {
        let removed = self.graph.with_write(LockId::NonLeafVertices, AcquirePattern::ObjectAndDependents, |gr| {
            gr.remove_non_leaf_vertex(g, |_, _| {}, |_| {})
        });
        if !removed {
            return Err(AccessError::not_found("Group", g.to_string()));
        }
        self.group_to_component.remove(g);
        self.group_to_entity.remove(g);
        Ok(())
    }

    // --- Add / Remove: group membership ---------------------------------

    pub fn add_user_to_group(&self, u: UserId, g: GroupId) -> Result<()> {
        self.ensure_user(&u)?;
        self.ensure_group(&g)?;
        let already = self.graph.with_read(|gr| gr.outgoing_leaf_edges(&u).contains(&g));
        if already {
            if self.is_dependency_free() {
                return Ok(());
            }
            return Err(AccessError::already_exists("UserToGroup", format!("{u}/{g}")));
        }
        self.graph.with_write(LockId::LeafToNonLeafEdges, AcquirePattern::ObjectAndDependencies, |gr| {
            gr.add_leaf_to_non_leaf_edge(u, g)
        })
    }

    pub fn remove_user_to_group(&self, u: &UserId, g: &GroupId) -> Result<()> {
        let removed = self.graph.with_write(LockId::LeafToNonLeafEdges, AcquirePattern::ObjectAndDependencies, |gr| {
            gr.remove_leaf_to_non_leaf_edge(u, g)
        });
        if !removed {
            return Err(AccessError::not_found("UserToGroup", format!("{u}/{g}")));
        }
        Ok(())
    }

    pub fn add_group_to_group(&self, from: GroupId, to: GroupId) -> Result<()> {
        self.ensure_group(&from)?;
        self.ensure_group(&to)?;
        let already = self.graph.with_read(|gr| gr.outgoing_non_leaf_edges(&from).contains(&to));
        if already {
            if self.is_dependency_free() {
                return Ok(());
            }
            return Err(AccessError::already_exists("GroupToGroup", format!("{from}/{to}")));
        }
        self.graph.with_write(LockId::NonLeafToNonLeafEdges, AcquirePattern::ObjectAndDependencies, |gr| {
            gr.add_non_leaf_to_non_leaf_edge(from, to)
        })
    }

    pub fn remove_group_to_group(&self, from: &GroupId, to: &GroupId) -> Result<()> {
        let removed = self.graph.with_write(LockId::NonLeafToNonLeafEdges, AcquirePattern::ObjectAndDependencies, |gr| {
            gr.remove_non_leaf_to_non_leaf_edge(from, to)
        });
        if !removed {
            return Err(AccessError::not_found("GroupToGroup", format!("{from}/{to}")));
        }
        Ok(())
    }

    // --- Add / Remove: component access ---------------------------------

    pub fn add_user_to_component_access(&self, u: UserId, c: ComponentAccess) -> Result<()> {
        self.ensure_user(&u)?;
        let mut entry = self.user_to_component.entry(u.clone()).or_default();
        if !entry.insert(c.clone()) && !self.is_dependency_free() {
            return Err(AccessError::already_exists("UserToComponentAccess", format!("{u}/{}/{}", c.0, c.1)));
        }
        Ok(())
    }

    pub fn remove_user_to_component_access(&self, u: &UserId, c: &ComponentAccess) -> Result<()> {
        let removed = self.user_to_component.get_mut(u).map(|mut s| s.remove(c)).unwrap_or(false);
        if !removed {
            return Err(AccessError::not_found("UserToComponentAccess", format!("{u}/{}/{}", c.0, c.1)));
        }
        Ok(())
    }

    pub fn add_group_to_component_access(&self, g: GroupId, c: ComponentAccess) -> Result<()> {
        self.ensure_group(&g)?;
        let mut entry = self.group_to_component.entry(g.clone()).or_default();
        if !entry.insert(c.clone()) && !self.is_dependency_free() {
            return Err(AccessError::already_exists("GroupToComponentAccess", format!("{g}/{}/{}", c.0, c.1)));
        }
        Ok(())
    }

    pub fn remove_group_to_component_access(&self, g: &GroupId, c: &ComponentAccess) -> Result<()> {
        let removed = self.group_to_component.get_mut(g).map(|mut s| s.remove(c)).unwrap_or(false);
        if !removed {
            return Err(AccessError::not_found("GroupToComponentAccess", format!("{g}/{}/{}", c.0, c.1)));
        }
        Ok(())
    }

    // --- Add / Remove: entity types and entities ------------------------

    pub fn add_entity_type(&self, et: EntityTypeId) -> Result<()> {
        let inserted = self.entity_types.insert(et.clone(), HashSet::new()).is_none();
        if !inserted && !self.is_dependency_free() {
            return Err(AccessError::already_exists("EntityType", et.to_string()));
        }
        Ok(())
    }

    pub fn remove_entity_type(&self, et: &EntityTypeId) -> Result<()> {
        if self.entity_types.remove(et).is_none() {
            return Err(AccessError::not_found("EntityType", et.to_string()));
        }
        for mut entry in self.user_to_entity.iter_mut() {
            entry.value_mut().remove(et);
        }
        for mut entry in self.group_to_entity.iter_mut() {
            entry.value_mut().remove(et);
        }
        Ok(())
    }

    pub fn add_entity(&self, et: EntityTypeId, e: EntityId) -> Result<()> {
        self.ensure_entity_type(&et)?;
        let inserted = self.entity_types.get_mut(&et).map(|mut s| s.insert(e.clone())).unwrap_or(false);
        if !inserted && !self.is_dependency_free() {
            return Err(AccessError::already_exists("Entity", format!("{et}/{e}")));
        }
        Ok(())
    }

    pub fn remove_entity(&self, et: &EntityTypeId, e: &EntityId) -> Result<()> {
        let removed = self.entity_types.get_mut(et).map(|mut s| s.remove(e)).unwrap_or(false);
        if !removed {
            return Err(AccessError::not_found("Entity", format!("{et}/{e}")));
        }
        for mut entry in self.user_to_entity.iter_mut() {
            if let Some(set) = entry.value_mut().get_mut(et) {
                set.remove(e);
            }
        }
        for mut entry in self.group_to_entity.iter_mut() {
            if let Some(set) = entry.value_mut().get_mut(et) {
                set.remove(e);
            }
        }
        Ok(())
    }

    pub fn add_user_to_entity(&self, u: UserId, et: EntityTypeId, e: EntityId) -> Result<()> {
        self.ensure_user(&u)?;
        self.ensure_entity(&et, &e)?;
        let mut entry = self.user_to_entity.entry(u.clone()).or_default();
        let set = entry.entry(et.clone()).or_default();
        if !set.insert(e.clone()) && !self.is_dependency_free() {
            return Err(AccessError::already_exists("UserToEntity", format!("{u}/{et}/{e}")));
        }
        Ok(())
    }

    pub fn remove_user_to_entity(&self, u: &UserId, et: &EntityTypeId, e: &EntityId) -> Result<()> {
        let removed = self
            .user_to_entity
            .get_mut(u)
            .and_then(|mut m| m.get_mut(et).map(|s| s.remove(e)))
            .unwrap_or(false);
        if !removed {
            return Err(AccessError::not_found("UserToEntity", format!("{u}/{et}/{e}")));
        }
        Ok(())
    }

    pub fn add_group_to_entity(&self, g: GroupId, et: EntityTypeId, e: EntityId) -> Result<()> {
        self.ensure_group(&g)?;
        self.ensure_entity(&et, &e)?;
        let mut entry = self.group_to_entity.entry(g.clone()).or_default();
        let set = entry.entry(et.clone()).or_default();
        if !set.insert(e.clone()) && !self.is_dependency_free() {
            return Err(AccessError::already_exists("GroupToEntity", format!("{g}/{et}/{e}")));
        }
        Ok(())
    }

    pub fn remove_group_to_entity(&self, g: &GroupId, et: &EntityTypeId, e: &EntityId) -> Result<()> {
        let removed = self
            .group_to_entity
            .get_mut(g)
            .and_then(|mut m| m.get_mut(et).map(|s| s.remove(e)))
            .unwrap_or(false);
        if !removed {
            return Err(AccessError::not_found("GroupToEntity", format!("{g}/{et}/{e}")));
        }
        Ok(())
    }

    // --- Membership queries ----------------------------------------------

    pub fn get_user_to_group_mappings(&self, u: &UserId, include_indirect: bool) -> HashSet<GroupId> {
        if include_indirect {
            self.graph.with_read(|g| g.non_leaf_closure_from_leaf(u))
        } else {
            self.graph.with_read(|g| g.outgoing_leaf_edges(u))
        }
    }

    pub fn get_group_to_group_mappings(&self, g: &GroupId, include_indirect: bool) -> HashSet<GroupId> {
        if include_indirect {
            self.graph.with_read(|gr| gr.non_leaf_closure_from_non_leaf(g))
        } else {
            self.graph.with_read(|gr| gr.outgoing_non_leaf_edges(g))
        }
    }

    /// Reverse of [`Self::get_user_to_group_mappings`]: users that belong to
    /// `g`, directly or (if `include_indirect`) through a chain of
    /// subgroups. Requires bidirectional storage for O(1) reverse lookups;
    /// otherwise the graph falls back to a scan (§4.A/§4.C).
    pub fn get_group_to_user_mappings(&self, g: &GroupId, include_indirect: bool) -> HashSet<UserId> {
        if !include_indirect {
            return self.graph.with_read(|gr| gr.incoming_leaf_edges(g));
        }
        self.graph.with_read(|gr| gr.non_leaf_reverse_closure(g).0)
    }

    pub fn get_group_to_group_reverse_mappings(&self, g: &GroupId) -> HashSet<GroupId> {
        self.graph.with_read(|gr| gr.incoming_non_leaf_edges(g))
    }

    // --- Access queries ----------------------------------------------------

    pub fn has_access_to_application_component(&self, u: &UserId, c: &ComponentId, a: &AccessLevelId) -> bool {
        self.get_application_components_accessible_by_user(u, true)
            .contains(&(c.clone(), a.clone()))
    }

    pub fn has_access_to_entity(&self, u: &UserId, et: &EntityTypeId, e: &EntityId) -> bool {
        self.get_entities_accessible_by_user(u, Some(et), true)
            .get(et)
            .map(|s| s.contains(e))
            .unwrap_or(false)
    }

    pub fn get_application_components_accessible_by_user(&self, u: &UserId, include_indirect: bool) -> HashSet<ComponentAccess> {
        let mut result = self.user_to_component.get(u).map(|s| s.clone()).unwrap_or_default();
        if include_indirect {
            for g in self.graph.with_read(|gr| gr.non_leaf_closure_from_leaf(u)) {
                if let Some(s) = self.group_to_component.get(&g) {
                    result.extend(s.iter().cloned());
                }
            }
        }
        result
    }

    pub fn get_application_components_accessible_by_group(&self, g: &GroupId, include_indirect: bool) -> HashSet<ComponentAccess> {
        let mut result = self.group_to_component.get(g).map(|s| s.clone()).unwrap_or_default();
        if include_indirect {
            for sub in self.graph.with_read(|gr| gr.non_leaf_closure_from_non_leaf(g)) {
                if let Some(s) = self.group_to_component.get(&sub) {
                    result.extend(s.iter().cloned());
                }
            }
        }
        result
    }

    pub fn get_entities_accessible_by_user(
        &self,
        u: &UserId,
        et: Option<&EntityTypeId>,
        include_indirect: bool,
    ) -> HashMap<EntityTypeId, HashSet<EntityId>> {
        let mut result = self.user_to_entity.get(u).map(|m| m.clone()).unwrap_or_default();
        if include_indirect {
            for g in self.graph.with_read(|gr| gr.non_leaf_closure_from_leaf(u)) {
                if let Some(m) = self.group_to_entity.get(&g) {
                    for (et_key, set) in m.iter() {
                        result.entry(et_key.clone()).or_default().extend(set.iter().cloned());
                    }
                }
            }
        }
        if let Some(et) = et {
            result.retain(|k, _| k == et);
        }
        result
    }

    pub fn get_entities_accessible_by_group(
        &self,
        g: &GroupId,
        et: Option<&EntityTypeId>,
        include_indirect: bool,
    ) -> HashMap<EntityTypeId, HashSet<EntityId>> {
        let mut result = self.group_to_entity.get(g).map(|m| m.clone()).unwrap_or_default();
        if include_indirect {
            for sub in self.graph.with_read(|gr| gr.non_leaf_closure_from_non_leaf(g)) {
                if let Some(m) = self.group_to_entity.get(&sub) {
                    for (et_key, set) in m.iter() {
                        result.entry(et_key.clone()).or_default().extend(set.iter().cloned());
                    }
                }
            }
        }
        if let Some(et) = et {
            result.retain(|k, _| k == et);
        }
        result
    }

    /// Reverse of [`Self::get_application_components_accessible_by_user`]:
    /// every user with `(c,a)`, directly or via group membership (§4.C).
    pub fn get_application_component_and_access_level_to_user_mappings(&self, c: &ComponentId, a: &AccessLevelId) -> HashSet<UserId> {
        let key = (c.clone(), a.clone());
        let mut users: HashSet<UserId> = self
            .user_to_component
            .iter()
            .filter(|entry| entry.value().contains(&key))
            .map(|entry| entry.key().clone())
            .collect();

        for entry in self.group_to_component.iter() {
            if entry.value().contains(&key) {
                let (leaves, _) = self.graph.with_read(|gr| gr.non_leaf_reverse_closure(entry.key()));
                users.extend(leaves);
            }
        }
        users
    }

    /// Groups with `(c,a)` granted directly, not through a subgroup. Used by
    /// the shard router to seed a frontier expansion when a group's access
    /// grants and its subgroup edges live on different shards (§4.H).
    pub fn groups_with_component_access(&self, c: &ComponentId, a: &AccessLevelId) -> HashSet<GroupId> {
        let key = (c.clone(), a.clone());
        self.group_to_component
            .iter()
            .filter(|entry| entry.value().contains(&key))
            .map(|entry| entry.key().clone())
            .collect()
    }

    pub fn get_entity_to_user_mappings(&self, et: &EntityTypeId, e: &EntityId) -> HashSet<UserId> {
        let mut users: HashSet<UserId> = self
            .user_to_entity
            .iter()
            .filter(|entry| entry.value().get(et).map(|s| s.contains(e)).unwrap_or(false))
            .map(|entry| entry.key().clone())
            .collect();

        for entry in self.group_to_entity.iter() {
            if entry.value().get(et).map(|s| s.contains(e)).unwrap_or(false) {
                let (leaves, _) = self.graph.with_read(|gr| gr.non_leaf_reverse_closure(entry.key()));
                users.extend(leaves);
            }
        }
        users
    }

    pub fn user_count(&self) -> usize {
        self.graph.with_read(|g| g.leaf_count())
    }

    pub fn group_count(&self) -> usize {
        self.graph.with_read(|g| g.non_leaf_count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::buffer::NoopPersister;
    use crate::events::EventBuffer;
    use crate::hashing::Crc32HashCodeGenerator;
    use std::sync::Arc;

    #[test]
    fn transitive_access_scenario() {
        let am = AccessManager::new_strict(EdgeStorage::Bidirectional);
        am.add_user(UserId::new("alice")).unwrap();
        am.add_group(GroupId::new("admins")).unwrap();
        am.add_group(GroupId::new("staff")).unwrap();
        am.add_user_to_group(UserId::new("alice"), GroupId::new("staff")).unwrap();
        am.add_group_to_group(GroupId::new("staff"), GroupId::new("admins")).unwrap();
        am.add_group_to_component_access(
            GroupId::new("admins"),
            (ComponentId::new("Orders"), AccessLevelId::new("View")),
        )
        .unwrap();

        assert!(am.has_access_to_application_component(
            &UserId::new("alice"),
            &ComponentId::new("Orders"),
            &AccessLevelId::new("View"),
        ));
    }

    #[test]
    fn cycle_rejection_scenario() {
        let am = AccessManager::new_strict(EdgeStorage::Bidirectional);
        for g in ["a", "b", "c"] {
            am.add_group(GroupId::new(g)).unwrap();
        }
        am.add_group_to_group(GroupId::new("a"), GroupId::new("b")).unwrap();
        am.add_group_to_group(GroupId::new("b"), GroupId::new("c")).unwrap();
        let err = am.add_group_to_group(GroupId::new("c"), GroupId::new("a"));
        assert!(matches!(err, Err(AccessError::WouldCreateCycle { .. })));
    }

    #[test]
    fn cascading_entity_type_removal_scenario() {
        let am = AccessManager::new_strict(EdgeStorage::Bidirectional);
        am.add_entity_type(EntityTypeId::new("ClientAccount")).unwrap();
        am.add_entity(EntityTypeId::new("ClientAccount"), EntityId::new("CompanyA")).unwrap();
        am.add_user(UserId::new("u")).unwrap();
        am.add_user_to_entity(UserId::new("u"), EntityTypeId::new("ClientAccount"), EntityId::new("CompanyA")).unwrap();

        am.remove_entity_type(&EntityTypeId::new("ClientAccount")).unwrap();

        let mappings = am.get_entities_accessible_by_user(&UserId::new("u"), None, false);
        assert!(mappings.is_empty());
    }

    #[test]
    fn strict_mode_rejects_duplicate_add() {
        let am = AccessManager::new_strict(EdgeStorage::Forward);
        am.add_user(UserId::new("dup")).unwrap();
        let err = am.add_user(UserId::new("dup"));
        assert!(matches!(err, Err(AccessError::AlreadyExists { .. })));
    }

    #[test]
    fn dependency_free_mode_synthesizes_missing_group_before_referring_event() {
        let buffer = Arc::new(EventBuffer::new(
            Default::default(),
            Arc::new(NoopPersister),
            Arc::new(crate::events::EventCache::new(16)),
        ));
        let am = AccessManager::new_dependency_free(
            EdgeStorage::Bidirectional,
            buffer.clone(),
            Arc::new(Crc32HashCodeGenerator),
        );

        am.add_user(UserId::new("alice")).unwrap();
        am.add_user_to_group(UserId::new("alice"), GroupId::new("ghost-group")).unwrap();

        let buffered = buffer.peek();
        assert_eq!(buffered.len(), 1);
        assert!(matches!(buffered[0].payload, EventPayload::Group { .. }));
        assert!(am.get_user_to_group_mappings(&UserId::new("alice"), false).contains(&GroupId::new("ghost-group")));
    }

    #[test]
    fn dependency_free_mode_duplicate_add_is_a_no_op() {
        let buffer = Arc::new(EventBuffer::new(
            Default::default(),
            Arc::new(NoopPersister),
            Arc::new(crate::events::EventCache::new(16)),
        ));
        let am = AccessManager::new_dependency_free(
            EdgeStorage::Forward,
            buffer,
            Arc::new(Crc32HashCodeGenerator),
        );
        am.add_user(UserId::new("alice")).unwrap();
        assert!(am.add_user(UserId::new("alice")).is_ok());
    }
}
