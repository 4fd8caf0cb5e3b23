//! Shard split/merge coordinator (§4.H). A split carves `[s,e)` out of a
//! shard and moves it to a new one in four steps: (1) new writes landing in
//! `[s,e)` are queued on a [`TemporaryRouterQueue`] instead of going to
//! either shard, (2) the source shard's existing events in `[s,e)` are
//! copied onto the destination by a [`BatchReplayer`], (3) the source
//! writer is polled until it reports no pending writes touching the range,
//! and (4) the configuration is updated and the queue drained onto the
//! destination. Resolves §9 Open Question 2 ("what happens if the
//! migration poll never reports complete"): literal abort-and-return — no
//! partial cutover, the old configuration stays authoritative and the
//! caller gets back `ServiceUnavailable`.

use super::{hash_in_range, ShardConfig, ShardGroup, ShardId};
use crate::access_manager::AccessManager;
use crate::error::{AccessError, Result};
use crate::events::TemporalEvent;
use crate::writer::apply_event_to_access_manager;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::Duration;
use uuid::Uuid;

/// Step 1: holds writes that land in a range under migration until the
/// cutover commits, so nothing routed to the old or new shard mid-split is
/// lost or double-applied.
#[derive(Default)]
pub struct TemporaryRouterQueue {
    queued: Mutex<VecDeque<TemporalEvent>>,
}

impl TemporaryRouterQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&self, event: TemporalEvent) {
        self.queued.lock().push_back(event);
    }

    pub fn len(&self) -> usize {
        self.queued.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queued.lock().is_empty()
    }

    /// Drains everything queued so far, in arrival order, for replay onto
    /// the destination shard (§4.H step 4 "drain the router's queue").
    fn drain(&self) -> Vec<TemporalEvent> {
        self.queued.lock().drain(..).collect()
    }
}

/// Step 2: copies a source shard's existing events onto the destination
/// shard in fixed-size batches, filtered to the range being moved, tracking
/// the id of the last event copied.
pub struct BatchReplayer {
    batch_size: usize,
}

impl BatchReplayer {
    pub fn new(batch_size: usize) -> Self {
        Self { batch_size: batch_size.max(1) }
    }

    pub fn replay(&self, source_events: &[TemporalEvent], range_start: u32, range_end: u32, destination: &AccessManager) -> Result<Option<Uuid>> {
        let matching: Vec<&TemporalEvent> =
            source_events.iter().filter(|e| hash_in_range(e.header.hash_code as u32, range_start, range_end)).collect();

        let mut last_copied = None;
        for batch in matching.chunks(self.batch_size) {
            for event in batch {
                apply_event_to_access_manager(destination, event.header.action, &event.payload)?;
                last_copied = Some(event.id());
            }
        }
        Ok(last_copied)
    }
}

/// Whether a shard's background data migration has finished applying every
/// queued mutation to its destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitStatus {
    InProgress,
    Complete,
}

/// Reports split/merge progress for a shard: "no pending writes touching
/// the range" (§4.H step 3).
#[async_trait]
pub trait SplitOperationsTracker: Send + Sync {
    async fn poll(&self, shard_id: ShardId) -> Result<SplitStatus>;
}

pub struct SplitCoordinator {
    max_poll_attempts: u32,
    poll_interval: Duration,
    batch_size: usize,
}

impl SplitCoordinator {
    pub fn new(max_poll_attempts: u32, poll_interval: Duration, batch_size: usize) -> Self {
        Self { max_poll_attempts, poll_interval, batch_size }
    }

    /// Splits `parent` at `split_point`: everything in `[split_point,
    /// parent's next range_start)` moves to `new_shard`. `source_events` is
    /// the source shard's existing event history, replayed onto
    /// `destination` before polling begins; `queue` holds whatever new
    /// writes landed in the range while the replay and poll ran, and is
    /// drained onto `destination` once the cutover commits. Polls `tracker`
    /// until it reports `Complete` or `max_poll_attempts` is exhausted, in
    /// which case the split is aborted and the original `config` is
    /// returned unchanged alongside a `ServiceUnavailable` error.
    pub async fn split(
        &self,
        config: &ShardConfig,
        parent: ShardId,
        split_point: u32,
        new_shard: ShardGroup,
        source_events: &[TemporalEvent],
        destination: &AccessManager,
        queue: &TemporaryRouterQueue,
        tracker: &dyn SplitOperationsTracker,
    ) -> Result<ShardConfig> {
        let (_, parent_end) = config.range_of(parent).ok_or_else(|| AccessError::not_found("Shard", format!("{parent:?}")))?;
        let replayer = BatchReplayer::new(self.batch_size);
        let last_copied = replayer.replay(source_events, split_point, parent_end, destination)?;
        tracing::info!(?parent, split_point, ?last_copied, "replayed source shard events into destination shard");

        for attempt in 0..self.max_poll_attempts {
            match tracker.poll(parent).await? {
                SplitStatus::Complete => {
                    let drained = queue.drain();
                    let drained_count = drained.len();
                    for event in &drained {
                        apply_event_to_access_manager(destination, event.header.action, &event.payload)?;
                    }
                    tracing::info!(?parent, split_point, attempt, drained = drained_count, "shard split complete, committing new configuration");
                    return config.with_split(parent, split_point, new_shard);
                }
                SplitStatus::InProgress => {
                    tokio::time::sleep(self.poll_interval).await;
                }
            }
        }
        tracing::error!(?parent, attempts = self.max_poll_attempts, "shard split did not complete in time, aborting cutover");
        Err(AccessError::ServiceUnavailable {
            reason: format!("shard split for {parent:?} did not complete within {} polls; old configuration remains authoritative", self.max_poll_attempts),
        })
    }

    /// Merges `absorbed` into `survivor`: `absorbed`'s whole range moves
    /// onto `destination` (expected to be the `AccessManager` backing
    /// `survivor`). Same replay/queue/poll contract as `split`, same
    /// abort-on-timeout behavior.
    pub async fn merge(
        &self,
        config: &ShardConfig,
        survivor: ShardId,
        absorbed: ShardId,
        source_events: &[TemporalEvent],
        destination: &AccessManager,
        queue: &TemporaryRouterQueue,
        tracker: &dyn SplitOperationsTracker,
    ) -> Result<ShardConfig> {
        let (start, end) = config.range_of(absorbed).ok_or_else(|| AccessError::not_found("Shard", format!("{absorbed:?}")))?;
        let replayer = BatchReplayer::new(self.batch_size);
        let last_copied = replayer.replay(source_events, start, end, destination)?;
        tracing::info!(?absorbed, ?survivor, ?last_copied, "replayed absorbed shard events onto survivor shard");

        for attempt in 0..self.max_poll_attempts {
            match tracker.poll(absorbed).await? {
                SplitStatus::Complete => {
                    let drained = queue.drain();
                    let drained_count = drained.len();
                    for event in &drained {
                        apply_event_to_access_manager(destination, event.header.action, &event.payload)?;
                    }
                    let remaining: Vec<ShardGroup> = config.groups().iter().filter(|g| g.shard_id != absorbed).cloned().collect();
                    tracing::info!(?survivor, ?absorbed, attempt, drained = drained_count, "shard merge complete, committing new configuration");
                    return Ok(ShardConfig::new(remaining));
                }
                SplitStatus::InProgress => {
                    tokio::time::sleep(self.poll_interval).await;
                }
            }
        }
        tracing::error!(?absorbed, attempts = self.max_poll_attempts, "shard merge did not complete in time, aborting cutover");
        Err(AccessError::ServiceUnavailable {
            reason: format!("shard merge absorbing {absorbed:?} did not complete within {} polls; old configuration remains authoritative", self.max_poll_attempts),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{Action, EventPayload};
    use crate::graph::EdgeStorage;
    use crate::ids::UserId;
    use chrono::Utc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn config() -> ShardConfig {
        ShardConfig::new(vec![
            ShardGroup { shard_id: ShardId(0), range_start: 0, endpoint: "shard-0".into() },
            ShardGroup { shard_id: ShardId(1), range_start: 2_000_000_000, endpoint: "shard-1".into() },
        ])
    }

    fn user_event(name: &str, hash_code: i32) -> TemporalEvent {
        TemporalEvent::new(Action::Add, EventPayload::User { u: UserId::new(name) }, hash_code, Utc::now())
    }

    struct CompletesAfter {
        remaining: AtomicU32,
    }

    #[async_trait]
    impl SplitOperationsTracker for CompletesAfter {
        async fn poll(&self, _shard_id: ShardId) -> Result<SplitStatus> {
            if self.remaining.fetch_sub(1, Ordering::SeqCst) > 0 {
                Ok(SplitStatus::InProgress)
            } else {
                Ok(SplitStatus::Complete)
            }
        }
    }

    struct NeverCompletes;

    #[async_trait]
    impl SplitOperationsTracker for NeverCompletes {
        async fn poll(&self, _shard_id: ShardId) -> Result<SplitStatus> {
            Ok(SplitStatus::InProgress)
        }
    }

    #[tokio::test]
    async fn split_replays_in_range_events_and_drains_the_queue_into_the_destination() {
        let coordinator = SplitCoordinator::new(5, Duration::from_millis(1), 1);
        let tracker = CompletesAfter { remaining: AtomicU32::new(2) };
        let destination = AccessManager::new_strict(EdgeStorage::Bidirectional);
        let queue = TemporaryRouterQueue::new();
        queue.enqueue(user_event("carol", 2_500_000_000u32 as i32));

        let source_events = vec![
            user_event("alice", 2_500_000_000u32 as i32), // in [2_000_000_000, wrap) -> moves
            user_event("bob", 500),                       // stays on the parent, filtered out
        ];

        let new_config = coordinator
            .split(
                &config(),
                ShardId(1),
                2_500_000_000,
                ShardGroup { shard_id: ShardId(2), range_start: 2_500_000_000, endpoint: "shard-2".into() },
                &source_events,
                &destination,
                &queue,
                &tracker,
            )
            .await
            .unwrap();

        assert_eq!(new_config.groups().len(), 3);
        assert_eq!(destination.user_count(), 2);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn split_aborts_and_returns_service_unavailable_on_timeout() {
        let coordinator = SplitCoordinator::new(3, Duration::from_millis(1), 100);
        let destination = AccessManager::new_strict(EdgeStorage::Bidirectional);
        let queue = TemporaryRouterQueue::new();
        let err = coordinator
            .split(
                &config(),
                ShardId(0),
                1_000_000_000,
                ShardGroup { shard_id: ShardId(2), range_start: 1_000_000_000, endpoint: "shard-2".into() },
                &[],
                &destination,
                &queue,
                &NeverCompletes,
            )
            .await;
        assert!(matches!(err, Err(AccessError::ServiceUnavailable { .. })));
    }

    #[tokio::test]
    async fn merge_removes_the_absorbed_shard_from_the_ring() {
        let coordinator = SplitCoordinator::new(5, Duration::from_millis(1), 100);
        let tracker = CompletesAfter { remaining: AtomicU32::new(0) };
        let destination = AccessManager::new_strict(EdgeStorage::Bidirectional);
        let queue = TemporaryRouterQueue::new();
        let source_events = vec![user_event("dave", 2_500_000_000u32 as i32)];

        let merged = coordinator
            .merge(&config(), ShardId(0), ShardId(1), &source_events, &destination, &queue, &tracker)
            .await
            .unwrap();

        assert_eq!(merged.groups().len(), 1);
        assert_eq!(merged.groups()[0].shard_id, ShardId(0));
        assert_eq!(destination.user_count(), 1);
    }
}
