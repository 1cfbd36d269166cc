//! PostgreSQL-backed implementation of the event log.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, PooledConnection};
use std::sync::Arc;
use uuid::Uuid;

use repsync_core::{EventRecord, SyncError, SyncResult};

use crate::db::schema::events;
use crate::db::DbPool;

use super::{EventLog, LogStats};

const SCHEMA_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS events (
    event_id        UUID PRIMARY KEY,
    event_type      VARCHAR NOT NULL,
    payload         JSONB NOT NULL,
    user_id         UUID NOT NULL,
    device_id       UUID NOT NULL,
    sequence_number BIGINT NOT NULL,
    correlation_id  UUID,
    created_at      TIMESTAMPTZ NOT NULL,
    recorded_at     TIMESTAMPTZ NOT NULL DEFAULT now()
);
CREATE INDEX IF NOT EXISTS idx_events_device_sequence
    ON events(device_id, sequence_number);
CREATE INDEX IF NOT EXISTS idx_events_user
    ON events(user_id);
"#;

/// Database model for log rows.
#[derive(Debug, Clone, Queryable, Insertable, Selectable)]
#[diesel(table_name = events)]
struct EventRow {
    event_id: Uuid,
    event_type: String,
    payload: serde_json::Value,
    user_id: Uuid,
    device_id: Uuid,
    sequence_number: i64,
    correlation_id: Option<Uuid>,
    created_at: DateTime<Utc>,
    recorded_at: DateTime<Utc>,
}

impl EventRow {
    fn from_record(record: &EventRecord, recorded_at: DateTime<Utc>) -> EventRow {
        EventRow {
            event_id: record.event_id,
            event_type: record.event_type.clone(),
            payload: record.payload.clone(),
            user_id: record.user_id,
            device_id: record.device_id,
            sequence_number: record.sequence_number,
            correlation_id: record.correlation_id,
            created_at: record.created_at,
            recorded_at,
        }
    }

    fn into_record(self) -> EventRecord {
        EventRecord {
            event_id: self.event_id,
            event_type: self.event_type,
            payload: self.payload,
            user_id: self.user_id,
            device_id: self.device_id,
            sequence_number: self.sequence_number,
            correlation_id: self.correlation_id,
            created_at: self.created_at,
        }
    }
}

/// PostgreSQL implementation of [`EventLog`].
pub struct PostgresEventLog {
    pool: Arc<DbPool>,
}

impl PostgresEventLog {
    pub fn new(pool: Arc<DbPool>) -> Self {
        Self { pool }
    }

    /// Create the log table and its indexes if they do not exist yet.
    pub fn ensure_schema(&self) -> SyncResult<()> {
        use diesel::connection::SimpleConnection;
        let mut conn = self.get_connection()?;
        conn.batch_execute(SCHEMA_DDL)
            .map_err(|e| SyncError::StorageFault {
                message: format!("failed to create log schema: {}", e),
            })
    }

    fn get_connection(
        &self,
    ) -> SyncResult<PooledConnection<ConnectionManager<PgConnection>>> {
        self.pool.get().map_err(|e| SyncError::StorageFault {
            message: format!("failed to get database connection: {}", e),
        })
    }
}

#[derive(QueryableByName)]
struct OverlapCount {
    #[diesel(sql_type = diesel::sql_types::BigInt)]
    overlapping: i64,
}

#[async_trait]
impl EventLog for PostgresEventLog {
    async fn append_batch(&self, events: &[EventRecord]) -> SyncResult<usize> {
        if events.is_empty() {
            return Ok(0);
        }

        let recorded_at = Utc::now();
        let rows: Vec<EventRow> = events
            .iter()
            .map(|record| EventRow::from_record(record, recorded_at))
            .collect();

        let mut conn = self.get_connection()?;
        let inserted = conn
            .transaction(|conn| {
                diesel::insert_into(events::table)
                    .values(&rows)
                    .on_conflict(events::event_id)
                    .do_nothing()
                    .execute(conn)
            })
            .map_err(|e| SyncError::StorageFault {
                message: format!("failed to append event batch: {}", e),
            })?;

        tracing::debug!(
            submitted = events.len(),
            inserted,
            "appended event batch to log"
        );
        Ok(inserted)
    }

    async fn events_ordered(&self, user_scope: Option<Uuid>) -> SyncResult<Vec<EventRecord>> {
        let mut conn = self.get_connection()?;

        let mut query = events::table.into_boxed();
        if let Some(user_id) = user_scope {
            query = query.filter(events::user_id.eq(user_id));
        }

        let rows: Vec<EventRow> = query
            .order((events::device_id.asc(), events::sequence_number.asc()))
            .load(&mut conn)
            .map_err(|e| SyncError::StorageFault {
                message: format!("failed to load ordered events: {}", e),
            })?;

        Ok(rows.into_iter().map(EventRow::into_record).collect())
    }

    async fn merge_user(
        &self,
        anonymous_user_id: Uuid,
        authenticated_user_id: Uuid,
    ) -> SyncResult<usize> {
        let mut conn = self.get_connection()?;

        let merged = conn
            .transaction(|conn| {
                let overlap: OverlapCount = diesel::sql_query(
                    "SELECT COUNT(*) AS overlapping \
                     FROM events a JOIN events b \
                       ON a.device_id = b.device_id \
                      AND a.sequence_number = b.sequence_number \
                    WHERE a.user_id = $1 AND b.user_id = $2",
                )
                .bind::<diesel::sql_types::Uuid, _>(anonymous_user_id)
                .bind::<diesel::sql_types::Uuid, _>(authenticated_user_id)
                .get_result(conn)?;

                if overlap.overlapping > 0 {
                    return Err(diesel::result::Error::RollbackTransaction);
                }

                diesel::update(events::table)
                    .filter(events::user_id.eq(anonymous_user_id))
                    .set(events::user_id.eq(authenticated_user_id))
                    .execute(conn)
            })
            .map_err(|e| match e {
                diesel::result::Error::RollbackTransaction => SyncError::MergeConflict {
                    message: format!(
                        "user {} already owns overlapping device sequences",
                        authenticated_user_id
                    ),
                },
                other => SyncError::StorageFault {
                    message: format!("failed to merge users: {}", other),
                },
            })?;

        tracing::info!(
            %anonymous_user_id,
            %authenticated_user_id,
            merged,
            "reattributed logged events"
        );
        Ok(merged)
    }

    async fn stats(&self) -> SyncResult<LogStats> {
        let mut conn = self.get_connection()?;

        #[derive(QueryableByName)]
        struct Stats {
            #[diesel(sql_type = diesel::sql_types::BigInt)]
            total_events: i64,
            #[diesel(sql_type = diesel::sql_types::BigInt)]
            distinct_users: i64,
            #[diesel(sql_type = diesel::sql_types::BigInt)]
            distinct_devices: i64,
        }

        let stats: Stats = diesel::sql_query(
            r#"
            SELECT
                (SELECT COUNT(*) FROM events) AS total_events,
                (SELECT COUNT(DISTINCT user_id) FROM events) AS distinct_users,
                (SELECT COUNT(DISTINCT device_id) FROM events) AS distinct_devices
            "#,
        )
        .get_result(&mut conn)
        .map_err(|e| SyncError::StorageFault {
            message: format!("failed to read log statistics: {}", e),
        })?;

        Ok(LogStats {
            total_events: stats.total_events as u64,
            distinct_users: stats.distinct_users as u64,
            distinct_devices: stats.distinct_devices as u64,
        })
    }
}
