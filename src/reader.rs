//! Reader node: rebuilds a local access-manager view from the event cache,
//! falling back to a full reload when the cache can't answer (§4.G). The
//! live view is swapped in behind a single `RwLock<Arc<AccessManager>>`
//! assignment so in-flight readers of the old snapshot are never disturbed —
//! the "hot swap via one reference assignment" the spec calls for.

use crate::access_manager::AccessManager;
use crate::error::{AccessError, Result};
use crate::events::EventCache;
use crate::external::PersistentReader;
use crate::graph::EdgeStorage;
use crate::writer::apply_event_to_access_manager;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

pub struct ReaderNode {
    access_manager: RwLock<Arc<AccessManager>>,
    /// `Uuid::nil()` means "no events consumed yet" — a real watermark
    /// value, not the absence of one, so `EventCache::get_all_events_since`
    /// can treat it as "everything currently cached" (§4.G, §8 scenario 4).
    latest_event_id: Mutex<Uuid>,
    cache: Arc<EventCache>,
    persistent_reader: Arc<dyn PersistentReader>,
    storage: EdgeStorage,
    initial_load_on_empty_cache: bool,
}

impl ReaderNode {
    pub fn new(
        cache: Arc<EventCache>,
        persistent_reader: Arc<dyn PersistentReader>,
        storage: EdgeStorage,
        initial_load_on_empty_cache: bool,
    ) -> Self {
        Self {
            access_manager: RwLock::new(Arc::new(AccessManager::new_strict(storage))),
            latest_event_id: Mutex::new(Uuid::nil()),
            cache,
            persistent_reader,
            storage,
            initial_load_on_empty_cache,
        }
    }

    pub fn snapshot(&self) -> Arc<AccessManager> {
        self.access_manager.read().clone()
    }

    pub fn latest_event_id(&self) -> Uuid {
        *self.latest_event_id.lock()
    }

    /// Unconditional full reload, for explicit use at startup regardless of
    /// `initial_load_on_empty_cache` (§9 Open Question 1).
    pub async fn bootstrap(&self) -> Result<()> {
        self.full_reload().await
    }

    /// One refresh cycle (§4.G):
    /// 1. Pull everything cached since the current watermark (a nil
    ///    watermark means "everything currently cached") and replay it in
    ///    order against the live snapshot.
    /// 2. `EventNotCached` (watermark aged out of the cache window): fall
    ///    back to a full reload.
    /// 3. `CacheEmpty` with a nil watermark: reload eagerly if configured
    ///    to, otherwise wait for the next cycle.
    pub async fn refresh(&self) -> Result<()> {
        let since = *self.latest_event_id.lock();
        match self.cache.get_all_events_since(since) {
            Ok(events) => {
                self.apply_events(&events);
                if let Some(last) = events.last() {
                    *self.latest_event_id.lock() = last.id();
                }
                Ok(())
            }
            Err(AccessError::EventNotCached { .. }) => {
                tracing::info!("watermark aged out of event cache, falling back to full reload");
                self.full_reload().await
            }
            Err(AccessError::CacheEmpty) => {
                if since.is_nil() && self.initial_load_on_empty_cache {
                    self.full_reload().await
                } else {
                    Ok(())
                }
            }
            Err(other) => Err(other),
        }
    }

    fn apply_events(&self, events: &[crate::events::TemporalEvent]) {
        let am = self.access_manager.read().clone();
        for event in events {
            if let Err(err) = apply_event_to_access_manager(&am, event.header.action, &event.payload) {
                tracing::warn!(error = %err, event_id = %event.id(), "skipped cached event during refresh");
            }
        }
    }

    async fn full_reload(&self) -> Result<()> {
        let mut fresh = AccessManager::new_strict(self.storage);
        let cursor = self
            .persistent_reader
            .load(&mut fresh)
            .await
            .map_err(|source| AccessError::ReaderRefreshFailed { source: Box::new(source) })?;
        *self.access_manager.write() = Arc::new(fresh);
        *self.latest_event_id.lock() = cursor.event_id;
        tracing::info!(event_id = %cursor.event_id, "reader reloaded full snapshot");
        Ok(())
    }
}

/// Owns the periodic background refresh for a [`ReaderNode`] (§4.G, §5).
pub struct AsyncReaderNode {
    inner: Arc<ReaderNode>,
    refresh_task: tokio::task::JoinHandle<()>,
}

impl AsyncReaderNode {
    pub fn spawn(inner: Arc<ReaderNode>, refresh_interval: Duration) -> Self {
        let task_inner = inner.clone();
        let refresh_task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(refresh_interval);
            loop {
                ticker.tick().await;
                if let Err(err) = task_inner.refresh().await {
                    tracing::error!(error = %err, "reader refresh failed");
                }
            }
        });
        Self { inner, refresh_task }
    }

    pub fn snapshot(&self) -> Arc<AccessManager> {
        self.inner.snapshot()
    }

    pub async fn refresh_now(&self) -> Result<()> {
        self.inner.refresh().await
    }
}

impl Drop for AsyncReaderNode {
    fn drop(&mut self) {
        self.refresh_task.abort();
    }
}
