//! Multi-reader / single-writer locking around the [`DirectedGraph`], with
//! dependency-ordered acquisition so adds and removes can never deadlock
//! against each other (§4.B).
//!
//! The graph itself lives behind a single `parking_lot::RwLock` for memory
//! safety (Rust has no way to hand out four independent `&mut` views into one
//! struct). The four *named* locks the spec describes are modeled
//! separately, as zero-sized coordination tokens (`RwLock<()>`): acquiring
//! them in dependency order blocks concurrent callers exactly the way the
//! spec requires before the short critical section against the real graph
//! lock runs. This keeps the deadlock-free ordering contract explicit and
//! testable without fighting the borrow checker over four live `&mut`
//! borrows of the same data.

use crate::graph::DirectedGraph;
use parking_lot::RwLock;
use std::hash::Hash;

/// The four named locks from §4.B, plus their acquisition order. Declaration
/// order below IS the global order used to prevent deadlock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockId {
    LeafVertices,
    NonLeafVertices,
    LeafToNonLeafEdges,
    NonLeafToNonLeafEdges,
}

impl LockId {
    const ALL: [LockId; 4] = [
        LockId::LeafVertices,
        LockId::NonLeafVertices,
        LockId::LeafToNonLeafEdges,
        LockId::NonLeafToNonLeafEdges,
    ];

    fn order(self) -> u8 {
        match self {
            LockId::LeafVertices => 0,
            LockId::NonLeafVertices => 1,
            LockId::LeafToNonLeafEdges => 2,
            LockId::NonLeafToNonLeafEdges => 3,
        }
    }

    /// Locks this lock depends on: edge locks depend on the vertex locks
    /// they span.
    fn dependencies(self) -> &'static [LockId] {
        match self {
            LockId::LeafVertices | LockId::NonLeafVertices => &[],
            LockId::LeafToNonLeafEdges => &[LockId::LeafVertices, LockId::NonLeafVertices],
            LockId::NonLeafToNonLeafEdges => &[LockId::NonLeafVertices],
        }
    }

    /// Locks that depend on this lock (the inverse of `dependencies`).
    fn dependents(self) -> Vec<LockId> {
        LockId::ALL
            .into_iter()
            .filter(|l| l.dependencies().contains(&self))
            .collect()
    }
}

/// Which acquisition pattern an operation uses (§4.B).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquirePattern {
    /// Acquire the lock AND everything it depends on. Used by adds: an edge
    /// must see its endpoints stable while it is being created.
    ObjectAndDependencies,
    /// Acquire the lock AND everything that depends on it. Used by removes:
    /// removing a vertex must block concurrent edge modifications to it.
    ObjectAndDependents,
}

/// Coordination tokens for the four named locks. Holds no data; real state
/// lives in [`ConcurrencyWrapper::graph`].
struct LockRegistry {
    tokens: [RwLock<()>; 4],
}

impl LockRegistry {
    fn new() -> Self {
        Self {
            tokens: [RwLock::new(()), RwLock::new(()), RwLock::new(()), RwLock::new(())],
        }
    }

    fn token(&self, id: LockId) -> &RwLock<()> {
        &self.tokens[id.order() as usize]
    }

    fn resolve(&self, id: LockId, pattern: AcquirePattern) -> Vec<LockId> {
        let mut set = match pattern {
            AcquirePattern::ObjectAndDependencies => {
                let mut v = id.dependencies().to_vec();
                v.push(id);
                v
            }
            AcquirePattern::ObjectAndDependents => {
                let mut v = id.dependents();
                v.push(id);
                v
            }
        };
        set.sort_by_key(|l| l.order());
        set.dedup();
        set
    }
}

/// Guard holding write locks on a resolved, ordered set of named locks.
/// Dropping it releases them in reverse order automatically.
pub struct LockGuardSet<'a> {
    _guards: Vec<parking_lot::RwLockWriteGuard<'a, ()>>,
}

/// Wraps a [`DirectedGraph`] with the named-lock coordination layer described
/// above. A `bypass` flag skips lock acquisition entirely for embeddings
/// that already hold equivalent locks at a higher layer (§4.B).
pub struct ConcurrencyWrapper<L, N>
where
    L: Eq + Hash + Clone,
    N: Eq + Hash + Clone,
{
    graph: RwLock<DirectedGraph<L, N>>,
    locks: LockRegistry,
    bypass: bool,
}

impl<L, N> ConcurrencyWrapper<L, N>
where
    L: Eq + Hash + Clone,
    N: Eq + Hash + Clone,
{
    pub fn new(graph: DirectedGraph<L, N>, bypass: bool) -> Self {
        Self {
            graph: RwLock::new(graph),
            locks: LockRegistry::new(),
            bypass,
        }
    }

    /// Acquire the named locks required for a mutation following `pattern`,
    /// then run `f` against the underlying graph under a write lock.
    pub fn with_write<F, R>(&self, lock: LockId, pattern: AcquirePattern, f: F) -> R
    where
        F: FnOnce(&mut DirectedGraph<L, N>) -> R,
    {
        if self.bypass {
            return f(&mut self.graph.write());
        }
        let order = self.locks.resolve(lock, pattern);
        let guards: Vec<_> = order.iter().map(|l| self.locks.token(*l).write()).collect();
        let _held = LockGuardSet { _guards: guards };
        f(&mut self.graph.write())
    }

    /// Pure reads take no named locks (§5: "readers acquire no locks on pure
    /// lookups that use concurrency-safe containers") — only the graph's own
    /// read lock, which can be held concurrently with other readers.
    pub fn with_read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&DirectedGraph<L, N>) -> R,
    {
        f(&self.graph.read())
    }
}
