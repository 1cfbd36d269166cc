//! Durable, crash-safe staging of outgoing events.
//!
//! The queue is the client-side source of truth: an event exists here from
//! the moment of the user action until the server acknowledges it. Rows move
//! through `pending -> syncing -> (deleted)`, with `failed` as the parking
//! state once the retry budget is spent.

pub mod memory;
pub mod sqlite;

#[cfg(test)]
mod tests;

use async_trait::async_trait;
use repsync_core::{EventRecord, SyncResult};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use memory::InMemoryEventQueue;
pub use sqlite::{SqliteEventQueue, SqliteQueueConfig};

/// Attempts after which an event is parked in `failed` and excluded from
/// automatic sync until explicitly reset.
pub const MAX_RETRY_COUNT: i32 = 5;

/// Queue-local status of a staged event.
///
/// `Synced` is transient: acknowledged rows are deleted, not kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueueStatus {
    Pending,
    Syncing,
    Synced,
    Failed,
}

impl From<String> for QueueStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "pending" => QueueStatus::Pending,
            "syncing" => QueueStatus::Syncing,
            "synced" => QueueStatus::Synced,
            "failed" => QueueStatus::Failed,
            _ => QueueStatus::Pending,
        }
    }
}

impl From<QueueStatus> for String {
    fn from(status: QueueStatus) -> Self {
        match status {
            QueueStatus::Pending => "pending".to_string(),
            QueueStatus::Syncing => "syncing".to_string(),
            QueueStatus::Synced => "synced".to_string(),
            QueueStatus::Failed => "failed".to_string(),
        }
    }
}

/// A staged event together with its queue-local state.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedEvent {
    pub record: EventRecord,
    pub status: QueueStatus,
    pub retry_count: i32,
}

impl QueuedEvent {
    pub fn new(record: EventRecord) -> Self {
        QueuedEvent {
            record,
            status: QueueStatus::Pending,
            retry_count: 0,
        }
    }
}

/// Counts by status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub pending: u64,
    pub syncing: u64,
    pub failed: u64,
}

impl QueueStats {
    pub fn total(&self) -> u64 {
        self.pending + self.syncing + self.failed
    }
}

/// Durable staging queue for outgoing events.
///
/// All bulk operations are transactional: either every row in the id set
/// moves, or none does. `enqueue` is idempotent on `event_id` - a duplicate
/// insert never disturbs the stored row's status, retry count or sequencing.
#[async_trait]
pub trait EventQueue: Send + Sync {
    /// Stage a batch of events in one durable transaction.
    async fn enqueue(&self, events: &[EventRecord]) -> SyncResult<()>;

    /// Rows with `status = pending` for the identity pair, ordered by
    /// `sequence_number` ascending.
    async fn get_pending(&self, device_id: Uuid, user_id: Uuid) -> SyncResult<Vec<QueuedEvent>>;

    /// Atomic bulk transition `pending -> syncing`. This is the only gate
    /// that hides events from subsequent `get_pending` calls.
    async fn mark_syncing(&self, event_ids: &[Uuid]) -> SyncResult<()>;

    /// Delete acknowledged rows. Nothing else removes events.
    async fn mark_synced(&self, event_ids: &[Uuid]) -> SyncResult<()>;

    /// Increment each row's retry count and return it to `pending`, or park
    /// it in `failed` once the budget is spent. Atomic across the id set.
    async fn mark_failed(&self, event_ids: &[Uuid]) -> SyncResult<()>;

    /// `failed -> pending` with the retry count zeroed, optionally scoped to
    /// one user. Returns the number of rows transitioned.
    async fn reset_failed(&self, user_id: Option<Uuid>) -> SyncResult<usize>;

    /// Reattribute every row owned by `old_user_id`, across all statuses.
    /// Returns the number of rows changed.
    async fn rewrite_user_id(&self, old_user_id: Uuid, new_user_id: Uuid) -> SyncResult<usize>;

    /// Restart recovery: rows left in `syncing` by a crashed process are
    /// ambiguous and return to `pending`. Server-side idempotency absorbs
    /// the duplicates. Returns the number of rows recovered.
    async fn recover_inflight(&self) -> SyncResult<usize>;

    /// Counts by status.
    async fn stats(&self) -> SyncResult<QueueStats>;

    /// Highest staged sequence number for a device, if any.
    async fn max_sequence(&self, device_id: Uuid) -> SyncResult<Option<i64>>;
}
