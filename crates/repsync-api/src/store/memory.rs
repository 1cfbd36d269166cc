//! In-memory implementation of the event log.
//!
//! Used by the test suites and by server deployments without a database
//! configured (demo mode). Semantics track the PostgreSQL store: idempotent
//! batch append, canonical replay order, conflict-checked merge.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use repsync_core::{EventRecord, SyncError, SyncResult};

use super::{EventLog, LogStats};

/// Non-durable [`EventLog`] holding rows in a read-write locked map.
pub struct InMemoryEventLog {
    rows: RwLock<HashMap<Uuid, EventRecord>>,
}

impl InMemoryEventLog {
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryEventLog {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventLog for InMemoryEventLog {
    async fn append_batch(&self, events: &[EventRecord]) -> SyncResult<usize> {
        let mut rows = self.rows.write().await;
        let mut inserted = 0;
        for record in events {
            if !rows.contains_key(&record.event_id) {
                rows.insert(record.event_id, record.clone());
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn events_ordered(&self, user_scope: Option<Uuid>) -> SyncResult<Vec<EventRecord>> {
        let rows = self.rows.read().await;
        let mut events: Vec<EventRecord> = rows
            .values()
            .filter(|record| user_scope.map_or(true, |user_id| record.user_id == user_id))
            .cloned()
            .collect();
        events.sort_by_key(|record| (record.device_id, record.sequence_number));
        Ok(events)
    }

    async fn merge_user(
        &self,
        anonymous_user_id: Uuid,
        authenticated_user_id: Uuid,
    ) -> SyncResult<usize> {
        let mut rows = self.rows.write().await;

        let owned: HashSet<(Uuid, i64)> = rows
            .values()
            .filter(|record| record.user_id == authenticated_user_id)
            .map(|record| (record.device_id, record.sequence_number))
            .collect();

        let conflicting = rows.values().any(|record| {
            record.user_id == anonymous_user_id
                && owned.contains(&(record.device_id, record.sequence_number))
        });
        if conflicting {
            return Err(SyncError::MergeConflict {
                message: format!(
                    "user {} already owns overlapping device sequences",
                    authenticated_user_id
                ),
            });
        }

        let mut merged = 0;
        for record in rows.values_mut() {
            if record.user_id == anonymous_user_id {
                record.user_id = authenticated_user_id;
                merged += 1;
            }
        }
        Ok(merged)
    }

    async fn stats(&self) -> SyncResult<LogStats> {
        let rows = self.rows.read().await;
        let distinct_users: HashSet<Uuid> = rows.values().map(|r| r.user_id).collect();
        let distinct_devices: HashSet<Uuid> = rows.values().map(|r| r.device_id).collect();
        Ok(LogStats {
            total_events: rows.len() as u64,
            distinct_users: distinct_users.len() as u64,
            distinct_devices: distinct_devices.len() as u64,
        })
    }
}
