//! The append-only event log.
//!
//! Inserts are the only mutation besides the merge rewrite; the uniqueness
//! constraint on `event_id` is the linearization point under concurrent
//! clients, so no application-level lock exists anywhere on this path.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use repsync_core::{EventRecord, SyncResult};

pub use memory::InMemoryEventLog;
pub use postgres::PostgresEventLog;

/// Counters describing the log.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct LogStats {
    pub total_events: u64,
    pub distinct_users: u64,
    pub distinct_devices: u64,
}

/// Durable, append-only storage for events.
#[async_trait]
pub trait EventLog: Send + Sync {
    /// Append a batch in one transaction, ignoring `event_id` conflicts.
    ///
    /// A conflict is not an error: the event already landed and the insert is
    /// a no-op (at-least-once delivery, exactly-once effect). Returns the
    /// number of rows actually inserted. A storage fault aborts the whole
    /// batch - there is no torn batch.
    async fn append_batch(&self, events: &[EventRecord]) -> SyncResult<usize>;

    /// Every event (optionally scoped to one user), in the canonical replay
    /// order: lexicographic on `(device_id, sequence_number)`.
    async fn events_ordered(&self, user_scope: Option<Uuid>) -> SyncResult<Vec<EventRecord>>;

    /// Reattribute every event owned by the anonymous identity to the
    /// authenticated one, in a single transaction.
    ///
    /// `device_id` and `sequence_number` are untouched. If the target
    /// identity already owns an event with an overlapping
    /// `(device_id, sequence_number)` pair the merge fails with
    /// [`repsync_core::SyncError::MergeConflict`]; sequences are never
    /// silently renumbered. Returns the number of reattributed events.
    async fn merge_user(
        &self,
        anonymous_user_id: Uuid,
        authenticated_user_id: Uuid,
    ) -> SyncResult<usize>;

    /// Log-level counters.
    async fn stats(&self) -> SyncResult<LogStats>;
}
