//! Writer node: the only path through which the graph is mutated (§4.E).
//! `WriterNode::apply` is the synchronous CPU-only core; `AsyncWriterNode`
//! is a thin tokio wrapper that owns the background flush loop, matching the
//! blocking-core/async-façade split the teacher draws between its storage
//! engine and its network layer.

use crate::access_manager::AccessManager;
use crate::error::Result;
use crate::events::{Action, EventBuffer, EventPayload, EventSink, EventValidator, FlushTrigger, NullValidator, TemporalEvent};
use crate::hashing::HashCodeGenerator;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Validates, applies to the access manager, then buffers the resulting
/// event — in that order, so a rejected mutation never reaches the buffer
/// (§4.E "abort before buffering on access-manager errors").
pub struct WriterNode {
    access_manager: Arc<AccessManager>,
    buffer: Arc<EventBuffer>,
    hash_gen: Arc<dyn HashCodeGenerator>,
    validator: Arc<dyn EventValidator>,
}

impl WriterNode {
    pub fn new(access_manager: Arc<AccessManager>, buffer: Arc<EventBuffer>, hash_gen: Arc<dyn HashCodeGenerator>) -> Self {
        Self {
            access_manager,
            buffer,
            hash_gen,
            validator: Arc::new(NullValidator),
        }
    }

    pub fn with_validator(mut self, validator: Arc<dyn EventValidator>) -> Self {
        self.validator = validator;
        self
    }

    pub fn apply(&self, action: Action, payload: EventPayload) -> Result<Uuid> {
        self.validator.validate(&payload, action)?;
        apply_event_to_access_manager(&self.access_manager, action, &payload)?;

        let hash_code = self.hash_gen.hash_code(payload.primary_element());
        let event = TemporalEvent::new(action, payload, hash_code, Utc::now());
        let event_id = event.id();
        tracing::debug!(event_id = %event_id, kind = event.payload.kind(), "applied event");
        self.buffer.emit(event)?;
        Ok(event_id)
    }
}

/// Replays one event's mutation against an access manager. Shared by
/// [`WriterNode::apply`] and [`crate::reader::ReaderNode`]'s incremental
/// catch-up, so both paths agree on what each of the ten payload kinds does.
pub fn apply_event_to_access_manager(am: &AccessManager, action: Action, payload: &EventPayload) -> Result<()> {
    match payload {
        EventPayload::User { u } => match action {
            Action::Add => am.add_user(u.clone()),
            Action::Remove => am.remove_user(u),
        },
        EventPayload::Group { g } => match action {
            Action::Add => am.add_group(g.clone()),
            Action::Remove => am.remove_group(g),
        },
        EventPayload::UserToGroup { u, g } => match action {
            Action::Add => am.add_user_to_group(u.clone(), g.clone()),
            Action::Remove => am.remove_user_to_group(u, g),
        },
        EventPayload::GroupToGroup { from_g, to_g } => match action {
            Action::Add => am.add_group_to_group(from_g.clone(), to_g.clone()),
            Action::Remove => am.remove_group_to_group(from_g, to_g),
        },
        EventPayload::UserToComponentAccess { u, c } => match action {
            Action::Add => am.add_user_to_component_access(u.clone(), c.clone()),
            Action::Remove => am.remove_user_to_component_access(u, c),
        },
        EventPayload::GroupToComponentAccess { g, c } => match action {
            Action::Add => am.add_group_to_component_access(g.clone(), c.clone()),
            Action::Remove => am.remove_group_to_component_access(g, c),
        },
        EventPayload::EntityType { et } => match action {
            Action::Add => am.add_entity_type(et.clone()),
            Action::Remove => am.remove_entity_type(et),
        },
        EventPayload::Entity { et, e } => match action {
            Action::Add => am.add_entity(et.clone(), e.clone()),
            Action::Remove => am.remove_entity(et, e),
        },
        EventPayload::UserToEntity { u, et, e } => match action {
            Action::Add => am.add_user_to_entity(u.clone(), et.clone(), e.clone()),
            Action::Remove => am.remove_user_to_entity(u, et, e),
        },
        EventPayload::GroupToEntity { g, et, e } => match action {
            Action::Add => am.add_group_to_entity(g.clone(), et.clone(), e.clone()),
            Action::Remove => am.remove_group_to_entity(g, et, e),
        },
    }
}

/// Owns the background flush loop around a [`WriterNode`] (§4.D, §5). The
/// loop polls `EventBuffer::due_trigger` on `poll_interval` and flushes when
/// a threshold is crossed; `flush_now` triggers an out-of-band manual flush.
pub struct AsyncWriterNode {
    inner: Arc<WriterNode>,
    buffer: Arc<EventBuffer>,
    flush_task: tokio::task::JoinHandle<()>,
}

impl AsyncWriterNode {
    pub fn spawn(inner: Arc<WriterNode>, buffer: Arc<EventBuffer>, poll_interval: Duration) -> Self {
        let task_buffer = buffer.clone();
        let flush_task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(poll_interval);
            loop {
                ticker.tick().await;
                if let Some(trigger) = task_buffer.due_trigger() {
                    if let Err(err) = task_buffer.flush(trigger).await {
                        tracing::warn!(error = %err, "event buffer flush failed, will retry next tick");
                    } else {
                        tracing::info!(?trigger, "flushed event buffer");
                    }
                }
            }
        });
        Self { inner, buffer, flush_task }
    }

    pub async fn apply(&self, action: Action, payload: EventPayload) -> Result<Uuid> {
        self.inner.apply(action, payload)
    }

    pub async fn flush_now(&self) -> Result<()> {
        self.buffer.flush(FlushTrigger::Manual).await
    }
}

impl Drop for AsyncWriterNode {
    fn drop(&mut self) {
        self.flush_task.abort();
    }
}
