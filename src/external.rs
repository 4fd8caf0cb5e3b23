//! Interfaces the core consumes from external collaborators (§6): a
//! persistent reader for full reloads, and a bulk event persister for
//! durable storage of flushed batches. Neither is implemented here — the
//! SQL/Mongo/file adapters that satisfy these traits are out of scope
//! (§1).

use crate::access_manager::AccessManager;
use crate::error::Result;
use crate::events::TemporalEvent;
use async_trait::async_trait;
use uuid::Uuid;

/// The cursor a `Load` returns: the event id and timestamp the loaded
/// snapshot is consistent up to, so a reader can resume incremental
/// refresh from exactly that point (§4.G step 3).
#[derive(Debug, Clone)]
pub struct SnapshotCursor {
    pub event_id: Uuid,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Loads a full snapshot of the authorization graph into `sink`, returning
/// the cursor it is consistent up to. Raises `PersistentStorageEmpty` when
/// the store has never been written to.
#[async_trait]
pub trait PersistentReader: Send + Sync {
    async fn load(&self, sink: &mut AccessManager) -> Result<SnapshotCursor>;
}

/// Durable log of events. Must be idempotent on `eventId`: the buffer may
/// call `persist_events` again with the same batch after a failed attempt
/// (§4.D).
#[async_trait]
pub trait BulkEventPersister: Send + Sync {
    async fn persist_events(&self, batch: &[TemporalEvent]) -> Result<()>;
}

/// Forwards each flushed batch to multiple persisters in sequence — the
/// writer node acting "as a distributor" per §4.E, e.g. one real storage
/// persister plus an observability sink. Stops at the first failure so the
/// buffer's retry-without-duplication contract is preserved.
pub struct DistributingEventPersister {
    persisters: Vec<std::sync::Arc<dyn BulkEventPersister>>,
}

impl DistributingEventPersister {
    pub fn new(persisters: Vec<std::sync::Arc<dyn BulkEventPersister>>) -> Self {
        Self { persisters }
    }
}

#[async_trait]
impl BulkEventPersister for DistributingEventPersister {
    async fn persist_events(&self, batch: &[TemporalEvent]) -> Result<()> {
        for persister in &self.persisters {
            persister.persist_events(batch).await?;
        }
        Ok(())
    }
}
