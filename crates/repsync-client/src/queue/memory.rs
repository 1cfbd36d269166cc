//! In-memory implementation of the event queue.
//!
//! Backs tests and the dry-run mode of the CLI; semantics mirror the SQLite
//! store exactly, including idempotent enqueue and atomic bulk transitions.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use repsync_core::{EventRecord, SyncResult};

use super::{EventQueue, QueueStats, QueueStatus, QueuedEvent, MAX_RETRY_COUNT};

/// Non-durable [`EventQueue`] holding rows in a mutex-guarded map.
pub struct InMemoryEventQueue {
    rows: Mutex<HashMap<Uuid, QueuedEvent>>,
}

impl InMemoryEventQueue {
    pub fn new() -> Self {
        Self {
            rows: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryEventQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventQueue for InMemoryEventQueue {
    async fn enqueue(&self, events: &[EventRecord]) -> SyncResult<()> {
        let mut rows = self.rows.lock().await;
        for record in events {
            // Duplicate inserts are no-ops; stored status fields survive.
            rows.entry(record.event_id)
                .or_insert_with(|| QueuedEvent::new(record.clone()));
        }
        Ok(())
    }

    async fn get_pending(&self, device_id: Uuid, user_id: Uuid) -> SyncResult<Vec<QueuedEvent>> {
        let rows = self.rows.lock().await;
        let mut pending: Vec<QueuedEvent> = rows
            .values()
            .filter(|row| {
                row.status == QueueStatus::Pending
                    && row.record.device_id == device_id
                    && row.record.user_id == user_id
            })
            .cloned()
            .collect();
        pending.sort_by_key(|row| row.record.sequence_number);
        Ok(pending)
    }

    async fn mark_syncing(&self, event_ids: &[Uuid]) -> SyncResult<()> {
        let mut rows = self.rows.lock().await;
        for event_id in event_ids {
            if let Some(row) = rows.get_mut(event_id) {
                if row.status == QueueStatus::Pending {
                    row.status = QueueStatus::Syncing;
                }
            }
        }
        Ok(())
    }

    async fn mark_synced(&self, event_ids: &[Uuid]) -> SyncResult<()> {
        let mut rows = self.rows.lock().await;
        for event_id in event_ids {
            rows.remove(event_id);
        }
        Ok(())
    }

    async fn mark_failed(&self, event_ids: &[Uuid]) -> SyncResult<()> {
        let mut rows = self.rows.lock().await;
        for event_id in event_ids {
            if let Some(row) = rows.get_mut(event_id) {
                row.retry_count += 1;
                row.status = if row.retry_count >= MAX_RETRY_COUNT {
                    QueueStatus::Failed
                } else {
                    QueueStatus::Pending
                };
            }
        }
        Ok(())
    }

    async fn reset_failed(&self, user_id: Option<Uuid>) -> SyncResult<usize> {
        let mut rows = self.rows.lock().await;
        let mut changed = 0;
        for row in rows.values_mut() {
            if row.status != QueueStatus::Failed {
                continue;
            }
            if let Some(user_id) = user_id {
                if row.record.user_id != user_id {
                    continue;
                }
            }
            row.status = QueueStatus::Pending;
            row.retry_count = 0;
            changed += 1;
        }
        Ok(changed)
    }

    async fn rewrite_user_id(&self, old_user_id: Uuid, new_user_id: Uuid) -> SyncResult<usize> {
        let mut rows = self.rows.lock().await;
        let mut changed = 0;
        for row in rows.values_mut() {
            if row.record.user_id == old_user_id {
                row.record.user_id = new_user_id;
                changed += 1;
            }
        }
        Ok(changed)
    }

    async fn recover_inflight(&self) -> SyncResult<usize> {
        let mut rows = self.rows.lock().await;
        let mut recovered = 0;
        for row in rows.values_mut() {
            if row.status == QueueStatus::Syncing {
                row.status = QueueStatus::Pending;
                recovered += 1;
            }
        }
        Ok(recovered)
    }

    async fn stats(&self) -> SyncResult<QueueStats> {
        let rows = self.rows.lock().await;
        let mut stats = QueueStats::default();
        for row in rows.values() {
            match row.status {
                QueueStatus::Pending => stats.pending += 1,
                QueueStatus::Syncing => stats.syncing += 1,
                QueueStatus::Failed => stats.failed += 1,
                QueueStatus::Synced => {}
            }
        }
        Ok(stats)
    }

    async fn max_sequence(&self, device_id: Uuid) -> SyncResult<Option<i64>> {
        let rows = self.rows.lock().await;
        Ok(rows
            .values()
            .filter(|row| row.record.device_id == device_id)
            .map(|row| row.record.sequence_number)
            .max())
    }
}
