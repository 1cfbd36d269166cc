//! SQLite-backed implementation of the durable event queue.
//!
//! Identifiers and timestamps are stored as text; the payload is stored as
//! its JSON serialization. The primary key on `event_id` is the idempotency
//! constraint, and every bulk operation runs inside an immediate transaction
//! so the id set moves as a unit.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool, PooledConnection};
use uuid::Uuid;

use repsync_core::{EventRecord, SyncError, SyncResult};

use super::{EventQueue, QueueStats, QueueStatus, QueuedEvent, MAX_RETRY_COUNT};

diesel::table! {
    event_queue (event_id) {
        event_id -> Text,
        event_type -> Text,
        payload -> Text,
        user_id -> Text,
        device_id -> Text,
        sequence_number -> BigInt,
        correlation_id -> Nullable<Text>,
        created_at -> Text,
        status -> Text,
        retry_count -> Integer,
    }
}

const SCHEMA_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS event_queue (
    event_id        TEXT PRIMARY KEY NOT NULL,
    event_type      TEXT NOT NULL,
    payload         TEXT NOT NULL,
    user_id         TEXT NOT NULL,
    device_id       TEXT NOT NULL,
    sequence_number BIGINT NOT NULL,
    correlation_id  TEXT,
    created_at      TEXT NOT NULL,
    status          TEXT NOT NULL DEFAULT 'pending',
    retry_count     INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS idx_event_queue_status
    ON event_queue(status);
CREATE INDEX IF NOT EXISTS idx_event_queue_device_sequence
    ON event_queue(device_id, sequence_number);
"#;

/// Configuration for the SQLite queue store.
#[derive(Debug, Clone)]
pub struct SqliteQueueConfig {
    pub database_path: String,
    pub connection_pool_size: u32,
    pub busy_timeout_ms: u32,
}

impl Default for SqliteQueueConfig {
    fn default() -> Self {
        Self {
            database_path: "repsync-queue.db".to_string(),
            connection_pool_size: 4,
            busy_timeout_ms: 5000,
        }
    }
}

#[derive(Debug)]
struct QueuePragmas {
    busy_timeout_ms: u32,
}

impl diesel::r2d2::CustomizeConnection<SqliteConnection, diesel::r2d2::Error> for QueuePragmas {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> Result<(), diesel::r2d2::Error> {
        conn.batch_execute(&format!(
            "PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL; PRAGMA busy_timeout = {};",
            self.busy_timeout_ms
        ))
        .map_err(diesel::r2d2::Error::QueryError)
    }
}

/// SQLite implementation of [`EventQueue`].
pub struct SqliteEventQueue {
    pool: Pool<ConnectionManager<SqliteConnection>>,
}

impl SqliteEventQueue {
    /// Open (and create if needed) the queue database at the configured path.
    pub fn open(config: SqliteQueueConfig) -> SyncResult<Self> {
        let manager = ConnectionManager::<SqliteConnection>::new(&config.database_path);
        let pool = Pool::builder()
            .max_size(config.connection_pool_size)
            .connection_customizer(Box::new(QueuePragmas {
                busy_timeout_ms: config.busy_timeout_ms,
            }))
            .build(manager)
            .map_err(|e| SyncError::StorageFault {
                message: format!("failed to create queue connection pool: {}", e),
            })?;

        let queue = Self { pool };
        queue.ensure_schema()?;
        Ok(queue)
    }

    fn ensure_schema(&self) -> SyncResult<()> {
        let mut conn = self.get_connection()?;
        conn.batch_execute(SCHEMA_DDL)
            .map_err(|e| SyncError::StorageFault {
                message: format!("failed to create queue schema: {}", e),
            })?;
        Ok(())
    }

    fn get_connection(
        &self,
    ) -> SyncResult<PooledConnection<ConnectionManager<SqliteConnection>>> {
        self.pool.get().map_err(|e| SyncError::StorageFault {
            message: format!("failed to get queue connection: {}", e),
        })
    }
}

/// Database model for queue rows.
#[derive(Debug, Clone, Queryable, Insertable, Selectable)]
#[diesel(table_name = event_queue)]
struct QueueRow {
    event_id: String,
    event_type: String,
    payload: String,
    user_id: String,
    device_id: String,
    sequence_number: i64,
    correlation_id: Option<String>,
    created_at: String,
    status: String,
    retry_count: i32,
}

impl QueueRow {
    fn from_record(record: &EventRecord) -> SyncResult<QueueRow> {
        Ok(QueueRow {
            event_id: record.event_id.to_string(),
            event_type: record.event_type.clone(),
            payload: serde_json::to_string(&record.payload)?,
            user_id: record.user_id.to_string(),
            device_id: record.device_id.to_string(),
            sequence_number: record.sequence_number,
            correlation_id: record.correlation_id.map(|id| id.to_string()),
            created_at: record.created_at.to_rfc3339(),
            status: String::from(QueueStatus::Pending),
            retry_count: 0,
        })
    }

    fn into_queued_event(self) -> SyncResult<QueuedEvent> {
        let parse_uuid = |field: &str, value: &str| {
            Uuid::parse_str(value).map_err(|e| SyncError::Serialization {
                message: format!("corrupt {} in queue row: {}", field, e),
            })
        };

        let created_at = DateTime::parse_from_rfc3339(&self.created_at)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| SyncError::Serialization {
                message: format!("corrupt created_at in queue row: {}", e),
            })?;

        let correlation_id = match self.correlation_id {
            Some(ref value) => Some(parse_uuid("correlation_id", value)?),
            None => None,
        };

        Ok(QueuedEvent {
            record: EventRecord {
                event_id: parse_uuid("event_id", &self.event_id)?,
                event_type: self.event_type,
                payload: serde_json::from_str(&self.payload)?,
                user_id: parse_uuid("user_id", &self.user_id)?,
                device_id: parse_uuid("device_id", &self.device_id)?,
                sequence_number: self.sequence_number,
                correlation_id,
                created_at,
            },
            status: QueueStatus::from(self.status),
            retry_count: self.retry_count,
        })
    }
}

fn id_strings(event_ids: &[Uuid]) -> Vec<String> {
    event_ids.iter().map(|id| id.to_string()).collect()
}

#[async_trait]
impl EventQueue for SqliteEventQueue {
    async fn enqueue(&self, events: &[EventRecord]) -> SyncResult<()> {
        if events.is_empty() {
            return Ok(());
        }

        let rows = events
            .iter()
            .map(QueueRow::from_record)
            .collect::<SyncResult<Vec<_>>>()?;

        let mut conn = self.get_connection()?;
        conn.immediate_transaction(|conn| {
            // OR IGNORE on the event_id primary key: a duplicate insert is a
            // no-op and the stored status and retry count stay untouched.
            diesel::insert_or_ignore_into(event_queue::table)
                .values(&rows)
                .execute(conn)?;
            Ok::<_, diesel::result::Error>(())
        })
        .map_err(|e| SyncError::StorageFault {
            message: format!("failed to enqueue events: {}", e),
        })?;

        tracing::debug!(count = events.len(), "staged events in local queue");
        Ok(())
    }

    async fn get_pending(&self, device_id: Uuid, user_id: Uuid) -> SyncResult<Vec<QueuedEvent>> {
        let mut conn = self.get_connection()?;

        let rows: Vec<QueueRow> = event_queue::table
            .filter(event_queue::status.eq(String::from(QueueStatus::Pending)))
            .filter(event_queue::device_id.eq(device_id.to_string()))
            .filter(event_queue::user_id.eq(user_id.to_string()))
            .order(event_queue::sequence_number.asc())
            .load(&mut conn)
            .map_err(|e| SyncError::StorageFault {
                message: format!("failed to load pending events: {}", e),
            })?;

        rows.into_iter().map(QueueRow::into_queued_event).collect()
    }

    async fn mark_syncing(&self, event_ids: &[Uuid]) -> SyncResult<()> {
        if event_ids.is_empty() {
            return Ok(());
        }
        let mut conn = self.get_connection()?;
        conn.immediate_transaction(|conn| {
            diesel::update(event_queue::table)
                .filter(event_queue::event_id.eq_any(id_strings(event_ids)))
                .filter(event_queue::status.eq(String::from(QueueStatus::Pending)))
                .set(event_queue::status.eq(String::from(QueueStatus::Syncing)))
                .execute(conn)?;
            Ok::<_, diesel::result::Error>(())
        })
        .map_err(|e| SyncError::StorageFault {
            message: format!("failed to mark events syncing: {}", e),
        })
    }

    async fn mark_synced(&self, event_ids: &[Uuid]) -> SyncResult<()> {
        if event_ids.is_empty() {
            return Ok(());
        }
        let mut conn = self.get_connection()?;
        conn.immediate_transaction(|conn| {
            diesel::delete(event_queue::table)
                .filter(event_queue::event_id.eq_any(id_strings(event_ids)))
                .execute(conn)?;
            Ok::<_, diesel::result::Error>(())
        })
        .map_err(|e| SyncError::StorageFault {
            message: format!("failed to delete synced events: {}", e),
        })
    }

    async fn mark_failed(&self, event_ids: &[Uuid]) -> SyncResult<()> {
        if event_ids.is_empty() {
            return Ok(());
        }
        let mut conn = self.get_connection()?;
        conn.immediate_transaction(|conn| {
            // Read-modify-write under one transaction so the whole id set
            // observes a consistent snapshot and moves atomically.
            let rows: Vec<(String, i32)> = event_queue::table
                .filter(event_queue::event_id.eq_any(id_strings(event_ids)))
                .select((event_queue::event_id, event_queue::retry_count))
                .load(conn)?;

            for (event_id, retry_count) in rows {
                let next_retry = retry_count + 1;
                let next_status = if next_retry >= MAX_RETRY_COUNT {
                    QueueStatus::Failed
                } else {
                    QueueStatus::Pending
                };
                diesel::update(event_queue::table)
                    .filter(event_queue::event_id.eq(&event_id))
                    .set((
                        event_queue::retry_count.eq(next_retry),
                        event_queue::status.eq(String::from(next_status)),
                    ))
                    .execute(conn)?;

                if next_status == QueueStatus::Failed {
                    tracing::warn!(%event_id, retries = next_retry, "event parked after retry budget spent");
                }
            }
            Ok::<_, diesel::result::Error>(())
        })
        .map_err(|e| SyncError::StorageFault {
            message: format!("failed to record sync failure: {}", e),
        })
    }

    async fn reset_failed(&self, user_id: Option<Uuid>) -> SyncResult<usize> {
        let mut conn = self.get_connection()?;
        conn.immediate_transaction(|conn| {
            let query = diesel::update(event_queue::table)
                .filter(event_queue::status.eq(String::from(QueueStatus::Failed)));
            let changed = match user_id {
                Some(user_id) => query
                    .filter(event_queue::user_id.eq(user_id.to_string()))
                    .set((
                        event_queue::status.eq(String::from(QueueStatus::Pending)),
                        event_queue::retry_count.eq(0),
                    ))
                    .execute(conn)?,
                None => query
                    .set((
                        event_queue::status.eq(String::from(QueueStatus::Pending)),
                        event_queue::retry_count.eq(0),
                    ))
                    .execute(conn)?,
            };
            Ok::<_, diesel::result::Error>(changed)
        })
        .map_err(|e| SyncError::StorageFault {
            message: format!("failed to reset failed events: {}", e),
        })
    }

    async fn rewrite_user_id(&self, old_user_id: Uuid, new_user_id: Uuid) -> SyncResult<usize> {
        let mut conn = self.get_connection()?;
        let changed = conn
            .immediate_transaction(|conn| {
                diesel::update(event_queue::table)
                    .filter(event_queue::user_id.eq(old_user_id.to_string()))
                    .set(event_queue::user_id.eq(new_user_id.to_string()))
                    .execute(conn)
            })
            .map_err(|e| SyncError::StorageFault {
                message: format!("failed to rewrite queue ownership: {}", e),
            })?;

        tracing::info!(%old_user_id, %new_user_id, changed, "rewrote queue ownership");
        Ok(changed)
    }

    async fn recover_inflight(&self) -> SyncResult<usize> {
        let mut conn = self.get_connection()?;
        let recovered = conn
            .immediate_transaction(|conn| {
                diesel::update(event_queue::table)
                    .filter(event_queue::status.eq(String::from(QueueStatus::Syncing)))
                    .set(event_queue::status.eq(String::from(QueueStatus::Pending)))
                    .execute(conn)
            })
            .map_err(|e| SyncError::StorageFault {
                message: format!("failed to recover in-flight events: {}", e),
            })?;

        if recovered > 0 {
            tracing::warn!(recovered, "restored ambiguous in-flight events to pending");
        }
        Ok(recovered)
    }

    async fn stats(&self) -> SyncResult<QueueStats> {
        let mut conn = self.get_connection()?;

        let count_for = |conn: &mut SqliteConnection, status: QueueStatus| {
            event_queue::table
                .filter(event_queue::status.eq(String::from(status)))
                .count()
                .get_result::<i64>(conn)
        };

        let pending = count_for(&mut conn, QueueStatus::Pending);
        let syncing = count_for(&mut conn, QueueStatus::Syncing);
        let failed = count_for(&mut conn, QueueStatus::Failed);

        match (pending, syncing, failed) {
            (Ok(pending), Ok(syncing), Ok(failed)) => Ok(QueueStats {
                pending: pending as u64,
                syncing: syncing as u64,
                failed: failed as u64,
            }),
            (Err(e), _, _) | (_, Err(e), _) | (_, _, Err(e)) => Err(SyncError::StorageFault {
                message: format!("failed to read queue stats: {}", e),
            }),
        }
    }

    async fn max_sequence(&self, device_id: Uuid) -> SyncResult<Option<i64>> {
        let mut conn = self.get_connection()?;
        event_queue::table
            .filter(event_queue::device_id.eq(device_id.to_string()))
            .select(diesel::dsl::max(event_queue::sequence_number))
            .first::<Option<i64>>(&mut conn)
            .map_err(|e| SyncError::StorageFault {
                message: format!("failed to read max sequence: {}", e),
            })
    }
}
