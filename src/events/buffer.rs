//! In-memory event buffer with pluggable flush triggers (§4.D). `emit` is
//! synchronous and only ever appends; the actual persist-then-cache flush is
//! async and driven externally (by `AsyncWriterNode`'s background task),
//! since `EventSink::emit` must stay callable from the access manager's
//! synchronous write path.

use super::cache::EventCache;
use super::{EventSink, TemporalEvent};
use crate::config::FlushStrategyConfig;
use crate::error::Result;
use crate::external::BulkEventPersister;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

/// Which condition caused a flush, surfaced for logging/metrics (§4.L).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushTrigger {
    Size,
    Interval,
    Manual,
}

pub struct EventBuffer {
    config: FlushStrategyConfig,
    persister: Arc<dyn BulkEventPersister>,
    cache: Arc<EventCache>,
    pending: Mutex<VecDeque<TemporalEvent>>,
    last_flush: Mutex<Instant>,
}

impl EventBuffer {
    pub fn new(config: FlushStrategyConfig, persister: Arc<dyn BulkEventPersister>, cache: Arc<EventCache>) -> Self {
        Self {
            config,
            persister,
            cache,
            pending: Mutex::new(VecDeque::new()),
            last_flush: Mutex::new(Instant::now()),
        }
    }

    pub fn add_event(&self, event: TemporalEvent) {
        self.pending.lock().push_back(event);
    }

    /// `Some(trigger)` the first time a configured threshold is crossed;
    /// the caller (typically `AsyncWriterNode`) polls this after every
    /// `add_event` and after its own interval tick.
    pub fn due_trigger(&self) -> Option<FlushTrigger> {
        if let Some(max_size) = self.config.max_size {
            if self.pending.lock().len() >= max_size {
                return Some(FlushTrigger::Size);
            }
        }
        if let Some(max_interval) = self.config.max_interval {
            if self.last_flush.lock().elapsed() >= max_interval {
                return Some(FlushTrigger::Interval);
            }
        }
        None
    }

    pub fn pending_len(&self) -> usize {
        self.pending.lock().len()
    }

    /// Non-destructive snapshot of what's currently buffered. Exists mainly
    /// so tests and metrics can observe buffer depth without racing a flush.
    pub fn peek(&self) -> Vec<TemporalEvent> {
        self.pending.lock().iter().cloned().collect()
    }

    /// Drains the buffer, persists the batch, then publishes it to the
    /// cache in the same order. On persist failure the batch is pushed back
    /// to the front of the buffer so a retry preserves arrival order and no
    /// event is lost or duplicated in the cache (§4.D).
    pub async fn flush(&self, _trigger: FlushTrigger) -> Result<()> {
        let batch: Vec<TemporalEvent> = {
            let mut pending = self.pending.lock();
            pending.drain(..).collect()
        };
        if batch.is_empty() {
            *self.last_flush.lock() = Instant::now();
            return Ok(());
        }
        match self.persister.persist_events(&batch).await {
            Ok(()) => {
                self.cache.cache_events(batch);
                *self.last_flush.lock() = Instant::now();
                Ok(())
            }
            Err(err) => {
                let mut pending = self.pending.lock();
                for event in batch.into_iter().rev() {
                    pending.push_front(event);
                }
                Err(err)
            }
        }
    }
}

impl EventSink for EventBuffer {
    fn emit(&self, event: TemporalEvent) -> Result<()> {
        self.add_event(event);
        Ok(())
    }
}

/// Persister that discards everything; used in tests and by callers that
/// only want the in-memory cache (no durable log).
pub struct NoopPersister;

#[async_trait::async_trait]
impl BulkEventPersister for NoopPersister {
    async fn persist_events(&self, _batch: &[TemporalEvent]) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AccessError;
    use crate::events::{Action, EventPayload};
    use crate::ids::UserId;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn event(name: &str) -> TemporalEvent {
        TemporalEvent::new(Action::Add, EventPayload::User { u: UserId::new(name) }, 0, Utc::now())
    }

    struct FailNTimes {
        remaining: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl BulkEventPersister for FailNTimes {
        async fn persist_events(&self, _batch: &[TemporalEvent]) -> Result<()> {
            if self.remaining.fetch_sub(1, Ordering::SeqCst) > 0 {
                return Err(AccessError::ServiceUnavailable { reason: "storage down".into() });
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn size_trigger_fires_once_max_size_reached() {
        let config = FlushStrategyConfig { max_size: Some(2), max_interval: None };
        let buffer = EventBuffer::new(config, Arc::new(NoopPersister), Arc::new(EventCache::new(16)));
        buffer.add_event(event("a"));
        assert!(buffer.due_trigger().is_none());
        buffer.add_event(event("b"));
        assert_eq!(buffer.due_trigger(), Some(FlushTrigger::Size));
    }

    #[tokio::test]
    async fn successful_flush_drains_buffer_and_populates_cache_in_order() {
        let config = FlushStrategyConfig { max_size: None, max_interval: None };
        let cache = Arc::new(EventCache::new(16));
        let buffer = EventBuffer::new(config, Arc::new(NoopPersister), cache.clone());
        buffer.add_event(event("a"));
        buffer.add_event(event("b"));

        buffer.flush(FlushTrigger::Manual).await.unwrap();

        assert_eq!(buffer.pending_len(), 0);
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test]
    async fn failed_flush_restores_order_for_retry() {
        let config = FlushStrategyConfig { max_size: None, max_interval: None };
        let persister = Arc::new(FailNTimes { remaining: AtomicUsize::new(1) });
        let cache = Arc::new(EventCache::new(16));
        let buffer = EventBuffer::new(config, persister, cache.clone());
        let a = event("a");
        let a_id = a.id();
        buffer.add_event(a);
        buffer.add_event(event("b"));

        let err = buffer.flush(FlushTrigger::Manual).await;
        assert!(err.is_err());
        assert_eq!(buffer.pending_len(), 2);
        assert_eq!(buffer.peek()[0].id(), a_id);

        buffer.flush(FlushTrigger::Manual).await.unwrap();
        assert_eq!(cache.len(), 2);
    }
}
