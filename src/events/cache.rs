//! Bounded, time-ordered cache of flushed events, keyed by event id (§4.F).
//! A reader uses it to catch up incrementally between full reloads; once an
//! event falls out of the window the reader has no choice but to reload.

use super::TemporalEvent;
use crate::error::{AccessError, Result};
use parking_lot::RwLock;
use std::collections::VecDeque;
use uuid::Uuid;

pub struct EventCache {
    capacity: usize,
    events: RwLock<VecDeque<TemporalEvent>>,
}

impl EventCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            events: RwLock::new(VecDeque::new()),
        }
    }

    /// Appends a flushed batch in order, evicting from the front once over
    /// capacity. Called only after a batch has durably persisted (§4.D).
    pub fn cache_events(&self, batch: Vec<TemporalEvent>) {
        let mut events = self.events.write();
        events.extend(batch);
        while events.len() > self.capacity {
            events.pop_front();
        }
    }

    /// Everything cached strictly after `event_id`. `Uuid::nil()` is the
    /// "beginning of time" sentinel a reader starts at and means "everything
    /// currently cached" rather than an unknown id. `CacheEmpty` if nothing
    /// has ever been cached; `EventNotCached` if the cache holds events but
    /// a non-nil `event_id` has already aged out of the window (§4.F, §4.G
    /// step 2).
    pub fn get_all_events_since(&self, event_id: Uuid) -> Result<Vec<TemporalEvent>> {
        let events = self.events.read();
        if events.is_empty() {
            return Err(AccessError::CacheEmpty);
        }
        if event_id.is_nil() {
            return Ok(events.iter().cloned().collect());
        }
        match events.iter().position(|e| e.id() == event_id) {
            Some(idx) => Ok(events.iter().skip(idx + 1).cloned().collect()),
            None => Err(AccessError::EventNotCached { prior_event_id: event_id }),
        }
    }

    pub fn latest_event_id(&self) -> Option<Uuid> {
        self.events.read().back().map(|e| e.id())
    }

    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }
}
