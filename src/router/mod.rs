//! Shard router: fans queries out across per-data-element-type shard rings
//! (§4.H). User, Group and GroupToGroupMapping each get their own
//! independently-sharded hash ring — a group does not have to live on the
//! same shard as its subgroup edges, let alone as the users that belong to
//! it. A query anchored on a single user or group routes by hash to exactly
//! one shard; a reverse query fans out across the relevant ring and unions
//! results; a transitive group query expands its frontier one hop at a time
//! across the group-to-group ring until nothing new is discovered.

pub mod split;

use crate::access_manager::AccessManager;
use crate::error::{AccessError, Result};
use crate::hashing::HashCodeGenerator;
use crate::ids::{AccessLevelId, ComponentId, EntityId, EntityTypeId, GroupId, UserId};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShardId(pub u32);

/// Which of the three independently-sharded rings a lookup routes through
/// (§4.H "a list per data-element type ∈ {User, GroupToGroupMapping,
/// Group}").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementType {
    User,
    Group,
    GroupToGroupMapping,
}

/// One shard's slice of a hash ring: owns every hash in `[range_start,
/// next group's range_start)`, with the last group (by `range_start`)
/// wrapping around back to the first (§4.H "cyclic wraparound").
#[derive(Debug, Clone)]
pub struct ShardGroup {
    pub shard_id: ShardId,
    pub range_start: u32,
    pub endpoint: String,
}

/// A single hash ring, sorted by `range_start` ascending. Each data-element
/// type in [`ShardTopology`] gets its own instance of this.
#[derive(Debug, Clone, Default)]
pub struct ShardConfig {
    groups: Vec<ShardGroup>,
}

impl ShardConfig {
    pub fn new(mut groups: Vec<ShardGroup>) -> Self {
        groups.sort_by_key(|g| g.range_start);
        Self { groups }
    }

    pub fn groups(&self) -> &[ShardGroup] {
        &self.groups
    }

    /// Binary search over `range_start` for the group owning `hash`,
    /// wrapping to the last group when `hash` is below the first group's
    /// start (§4.H).
    pub fn shard_for_hash(&self, hash: u32) -> Option<&ShardGroup> {
        if self.groups.is_empty() {
            return None;
        }
        let idx = self.groups.partition_point(|g| g.range_start <= hash);
        if idx == 0 {
            self.groups.last()
        } else {
            self.groups.get(idx - 1)
        }
    }

    /// The `[start, end)` range owned by `shard_id`, cyclic: `end` is the
    /// next group's `range_start`, wrapping to the first group's for the
    /// last one.
    pub fn range_of(&self, shard_id: ShardId) -> Option<(u32, u32)> {
        let idx = self.groups.iter().position(|g| g.shard_id == shard_id)?;
        let start = self.groups[idx].range_start;
        let end = self.groups[(idx + 1) % self.groups.len()].range_start;
        Some((start, end))
    }

    /// Produces a new configuration with `parent` split at `split_point`
    /// into itself (retaining `[old_start, split_point)`) and `new_shard`
    /// (taking `[split_point, old_next_start)`). Used by
    /// [`split::SplitCoordinator`] once a split's data migration completes.
    pub fn with_split(&self, parent: ShardId, split_point: u32, new_shard: ShardGroup) -> Result<ShardConfig> {
        if !self.groups.iter().any(|g| g.shard_id == parent) {
            return Err(AccessError::not_found("Shard", format!("{parent:?}")));
        }
        let mut groups = self.groups.clone();
        groups.push(ShardGroup { shard_id: new_shard.shard_id, range_start: split_point, endpoint: new_shard.endpoint });
        Ok(ShardConfig::new(groups))
    }
}

/// Whether `hash` falls in `[start, end)`, wrapping past `u32::MAX` when
/// `end <= start` (§4.H "the last wrapping to int32.MaxValue + 1").
pub fn hash_in_range(hash: u32, start: u32, end: u32) -> bool {
    if start < end {
        hash >= start && hash < end
    } else {
        hash >= start || hash < end
    }
}

/// The full shard configuration (§4.H): one independently-sharded ring per
/// data-element type. A group's subgroup edges and its component/entity
/// grants are looked up on its own `group` shard; transitive group-to-group
/// traversal happens against `group_to_group`, which may place a group's
/// edges on a different shard than the group's own direct grants.
#[derive(Debug, Clone, Default)]
pub struct ShardTopology {
    pub user: ShardConfig,
    pub group: ShardConfig,
    pub group_to_group: ShardConfig,
}

impl ShardTopology {
    fn ring(&self, element: ElementType) -> &ShardConfig {
        match element {
            ElementType::User => &self.user,
            ElementType::Group => &self.group,
            ElementType::GroupToGroupMapping => &self.group_to_group,
        }
    }
}

/// Per-shard data access, abstracting over "local `AccessManager`" (used in
/// tests and single-process deployments) and a real RPC client to a remote
/// writer/reader node. `element` selects which ring `shard_id` was drawn
/// from, since the three rings have independent id spaces.
#[async_trait]
pub trait ShardBackend: Send + Sync {
    async fn access_manager(&self, element: ElementType, shard_id: ShardId) -> Result<Arc<AccessManager>>;
}

fn ring_shard_ids(ring: &ShardConfig) -> Vec<ShardId> {
    ring.groups().iter().map(|g| g.shard_id).collect()
}

/// Synchronous routing plus the async fan-out/aggregation queries (§4.H).
/// Mutating operations don't route through here — a writer always owns one
/// shard directly.
pub struct ShardRouter {
    topology: RwLock<Arc<ShardTopology>>,
    backend: Arc<dyn ShardBackend>,
    hash_gen: Arc<dyn HashCodeGenerator>,
}

impl ShardRouter {
    pub fn new(topology: ShardTopology, backend: Arc<dyn ShardBackend>, hash_gen: Arc<dyn HashCodeGenerator>) -> Self {
        Self {
            topology: RwLock::new(Arc::new(topology)),
            backend,
            hash_gen,
        }
    }

    pub fn current_topology(&self) -> Arc<ShardTopology> {
        self.topology.read().clone()
    }

    pub fn replace_topology(&self, topology: ShardTopology) {
        *self.topology.write() = Arc::new(topology);
    }

    fn shard_for(&self, element: ElementType, key: &str, topology: &ShardTopology) -> Result<ShardGroup> {
        let hash = self.hash_gen.hash_code(key) as u32;
        topology
            .ring(element)
            .shard_for_hash(hash)
            .cloned()
            .ok_or_else(|| AccessError::ServiceUnavailable { reason: format!("no shards configured for {element:?}") })
    }

    /// Routes to the single shard owning `u` on the user ring, retrying
    /// exactly once against a freshly re-read topology if the first attempt
    /// fails (§4.H "retry once on routing error").
    async fn user_shard(&self, topology: &ShardTopology, u: &UserId) -> Result<Arc<AccessManager>> {
        let shard = self.shard_for(ElementType::User, u.as_str(), topology)?;
        match self.backend.access_manager(ElementType::User, shard.shard_id).await {
            Ok(am) => Ok(am),
            Err(first_err) => {
                tracing::warn!(error = %first_err, shard = ?shard.shard_id, "routing attempt failed, retrying once");
                let topology = self.current_topology();
                let retried = self.shard_for(ElementType::User, u.as_str(), &topology)?;
                self.backend.access_manager(ElementType::User, retried.shard_id).await
            }
        }
    }

    async fn group_shard(&self, topology: &ShardTopology, g: &GroupId) -> Result<Arc<AccessManager>> {
        let shard = self.shard_for(ElementType::Group, g.as_str(), topology)?;
        match self.backend.access_manager(ElementType::Group, shard.shard_id).await {
            Ok(am) => Ok(am),
            Err(first_err) => {
                tracing::warn!(error = %first_err, shard = ?shard.shard_id, "routing attempt failed, retrying once");
                let topology = self.current_topology();
                let retried = self.shard_for(ElementType::Group, g.as_str(), &topology)?;
                self.backend.access_manager(ElementType::Group, retried.shard_id).await
            }
        }
    }

    async fn group_to_group_shard(&self, topology: &ShardTopology, g: &GroupId) -> Result<Arc<AccessManager>> {
        let shard = self.shard_for(ElementType::GroupToGroupMapping, g.as_str(), topology)?;
        match self.backend.access_manager(ElementType::GroupToGroupMapping, shard.shard_id).await {
            Ok(am) => Ok(am),
            Err(first_err) => {
                tracing::warn!(error = %first_err, shard = ?shard.shard_id, "routing attempt failed, retrying once");
                let topology = self.current_topology();
                let retried = self.shard_for(ElementType::GroupToGroupMapping, g.as_str(), &topology)?;
                self.backend.access_manager(ElementType::GroupToGroupMapping, retried.shard_id).await
            }
        }
    }

    /// Walks the group-to-group ring one hop at a time from `seed`, via
    /// `next` (forward edges for an ancestor closure, reverse edges for a
    /// descendant closure), until the frontier stops growing (§4.H
    /// "iteratively expand the frontier... until the frontier stops
    /// growing"). Each hop's neighbors are looked up on whichever shard
    /// owns that hop's group, so the closure can span the whole ring.
    async fn expand_group_frontier(
        &self,
        topology: &ShardTopology,
        seed: HashSet<GroupId>,
        next: impl Fn(&AccessManager, &GroupId) -> HashSet<GroupId>,
    ) -> Result<HashSet<GroupId>> {
        let mut closure = seed.clone();
        let mut frontier = seed;
        while !frontier.is_empty() {
            let mut discovered = HashSet::new();
            for g in &frontier {
                let am = self.group_to_group_shard(topology, g).await?;
                for candidate in next(&am, g) {
                    if closure.insert(candidate.clone()) {
                        discovered.insert(candidate);
                    }
                }
            }
            frontier = discovered;
        }
        Ok(closure)
    }

    pub async fn has_access_to_application_component(&self, u: &UserId, c: &ComponentId, a: &AccessLevelId) -> Result<bool> {
        let topology = self.current_topology();
        let user_am = self.user_shard(&topology, u).await?;
        if user_am.get_application_components_accessible_by_user(u, false).contains(&(c.clone(), a.clone())) {
            return Ok(true);
        }
        let direct_groups = user_am.get_user_to_group_mappings(u, false);
        let ancestors = self
            .expand_group_frontier(&topology, direct_groups, |am, g| am.get_group_to_group_mappings(g, false))
            .await?;
        for g in &ancestors {
            let group_am = self.group_shard(&topology, g).await?;
            if group_am.get_application_components_accessible_by_group(g, false).contains(&(c.clone(), a.clone())) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    pub async fn get_entities_accessible_by_user(
        &self,
        u: &UserId,
        et: Option<&EntityTypeId>,
        include_indirect: bool,
    ) -> Result<HashMap<EntityTypeId, HashSet<EntityId>>> {
        let topology = self.current_topology();
        let user_am = self.user_shard(&topology, u).await?;
        let mut result = user_am.get_entities_accessible_by_user(u, et, false);
        if include_indirect {
            let direct_groups = user_am.get_user_to_group_mappings(u, false);
            let ancestors = self
                .expand_group_frontier(&topology, direct_groups, |am, g| am.get_group_to_group_mappings(g, false))
                .await?;
            for g in &ancestors {
                let group_am = self.group_shard(&topology, g).await?;
                for (et_key, set) in group_am.get_entities_accessible_by_group(g, et, false) {
                    result.entry(et_key).or_default().extend(set);
                }
            }
        }
        Ok(result)
    }

    /// Reverse lookup: finds every group with `(c,a)` granted directly on
    /// the group ring, expands each into its descendant closure on the
    /// group-to-group ring (a subgroup's members inherit its parent's
    /// grants), then fans out across the user ring for direct grants and
    /// membership in any of those groups.
    pub async fn get_application_component_and_access_level_to_user_mappings(
        &self,
        c: &ComponentId,
        a: &AccessLevelId,
    ) -> Result<HashSet<UserId>> {
        let topology = self.current_topology();

        let mut granting_groups = HashSet::new();
        for shard_id in ring_shard_ids(&topology.group) {
            let am = self.backend.access_manager(ElementType::Group, shard_id).await?;
            granting_groups.extend(am.groups_with_component_access(c, a));
        }
        let reachable_groups = self
            .expand_group_frontier(&topology, granting_groups, |am, g| am.get_group_to_group_reverse_mappings(g))
            .await?;

        let mut users = HashSet::new();
        for shard_id in ring_shard_ids(&topology.user) {
            let am = self.backend.access_manager(ElementType::User, shard_id).await?;
            users.extend(am.get_application_component_and_access_level_to_user_mappings(c, a));
            for g in &reachable_groups {
                users.extend(am.get_group_to_user_mappings(g, false));
            }
        }
        Ok(users)
    }

    /// Members of `g`, directly or (if `include_indirect`) through any
    /// subgroup reachable via the group-to-group ring's reverse edges.
    pub async fn get_group_to_user_mappings(&self, g: &GroupId, include_indirect: bool) -> Result<HashSet<UserId>> {
        let topology = self.current_topology();
        let groups = if include_indirect {
            self.expand_group_frontier(&topology, std::iter::once(g.clone()).collect(), |am, g| am.get_group_to_group_reverse_mappings(g))
                .await?
        } else {
            std::iter::once(g.clone()).collect()
        };
        let mut users = HashSet::new();
        for group in &groups {
            for shard_id in ring_shard_ids(&topology.user) {
                let am = self.backend.access_manager(ElementType::User, shard_id).await?;
                users.extend(am.get_group_to_user_mappings(group, false));
            }
        }
        Ok(users)
    }
}

/// Owns the periodic shard-configuration refresh (§4.H, §5).
pub struct AsyncShardRouterClient {
    inner: Arc<ShardRouter>,
    refresh_task: tokio::task::JoinHandle<()>,
}

/// Fetches a fresh [`ShardTopology`] from wherever the deployment publishes
/// it (§4.H `shard_config_endpoint`). Not implemented here — see §1
/// Non-goals.
#[async_trait]
pub trait ShardConfigLoader: Send + Sync {
    async fn load(&self, endpoint: &str) -> Result<ShardTopology>;
}

impl AsyncShardRouterClient {
    pub fn spawn(inner: Arc<ShardRouter>, loader: Arc<dyn ShardConfigLoader>, endpoint: String, refresh_interval: Duration) -> Self {
        let task_inner = inner.clone();
        let refresh_task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(refresh_interval);
            loop {
                ticker.tick().await;
                match loader.load(&endpoint).await {
                    Ok(topology) => task_inner.replace_topology(topology),
                    Err(err) => tracing::warn!(error = %err, "shard config refresh failed, keeping current configuration"),
                }
            }
        });
        Self { inner, refresh_task }
    }

    pub fn router(&self) -> Arc<ShardRouter> {
        self.inner.clone()
    }
}

impl Drop for AsyncShardRouterClient {
    fn drop(&mut self) {
        self.refresh_task.abort();
    }
}
