//! PostgreSQL-backed projection tables.
//!
//! `replace` holds one transaction over both tables, so readers observe the
//! old fold or the new one, never a mixture.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, PooledConnection};
use std::sync::Arc;
use uuid::Uuid;

use repsync_core::{SyncError, SyncResult};

use crate::db::schema::{sets_projection, workouts_projection};
use crate::db::DbPool;

use super::{ProjectionStore, SetRow, WorkoutRow, WorkoutStatus};

const SCHEMA_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS workouts_projection (
    workout_id UUID PRIMARY KEY,
    user_id    UUID NOT NULL,
    started_at TIMESTAMPTZ NOT NULL,
    ended_at   TIMESTAMPTZ,
    status     VARCHAR NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_workouts_projection_user
    ON workouts_projection(user_id);
CREATE TABLE IF NOT EXISTS sets_projection (
    set_id       UUID PRIMARY KEY,
    workout_id   UUID NOT NULL,
    exercise_id  UUID NOT NULL,
    reps         INTEGER NOT NULL,
    weight       DOUBLE PRECISION NOT NULL,
    completed_at TIMESTAMPTZ NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_sets_projection_workout
    ON sets_projection(workout_id);
"#;

#[derive(Debug, Clone, Queryable, Insertable, Selectable)]
#[diesel(table_name = workouts_projection)]
struct WorkoutProjectionRow {
    workout_id: Uuid,
    user_id: Uuid,
    started_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
    status: String,
}

impl From<&WorkoutRow> for WorkoutProjectionRow {
    fn from(row: &WorkoutRow) -> Self {
        Self {
            workout_id: row.workout_id,
            user_id: row.user_id,
            started_at: row.started_at,
            ended_at: row.ended_at,
            status: String::from(row.status),
        }
    }
}

impl From<WorkoutProjectionRow> for WorkoutRow {
    fn from(row: WorkoutProjectionRow) -> Self {
        Self {
            workout_id: row.workout_id,
            user_id: row.user_id,
            started_at: row.started_at,
            ended_at: row.ended_at,
            status: WorkoutStatus::from(row.status),
        }
    }
}

#[derive(Debug, Clone, Queryable, Insertable, Selectable)]
#[diesel(table_name = sets_projection)]
struct SetProjectionRow {
    set_id: Uuid,
    workout_id: Uuid,
    exercise_id: Uuid,
    reps: i32,
    weight: f64,
    completed_at: DateTime<Utc>,
}

impl From<&SetRow> for SetProjectionRow {
    fn from(row: &SetRow) -> Self {
        Self {
            set_id: row.set_id,
            workout_id: row.workout_id,
            exercise_id: row.exercise_id,
            reps: row.reps,
            weight: row.weight,
            completed_at: row.completed_at,
        }
    }
}

impl From<SetProjectionRow> for SetRow {
    fn from(row: SetProjectionRow) -> Self {
        Self {
            set_id: row.set_id,
            workout_id: row.workout_id,
            exercise_id: row.exercise_id,
            reps: row.reps,
            weight: row.weight,
            completed_at: row.completed_at,
        }
    }
}

/// PostgreSQL implementation of [`ProjectionStore`].
pub struct PostgresProjectionStore {
    pool: Arc<DbPool>,
}

impl PostgresProjectionStore {
    pub fn new(pool: Arc<DbPool>) -> Self {
        Self { pool }
    }

    /// Create the projection tables and their indexes if missing.
    pub fn ensure_schema(&self) -> SyncResult<()> {
        use diesel::connection::SimpleConnection;
        let mut conn = self.get_connection()?;
        conn.batch_execute(SCHEMA_DDL)
            .map_err(|e| SyncError::StorageFault {
                message: format!("failed to create projection schema: {}", e),
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

#[async_trait]
impl ProjectionStore for PostgresProjectionStore {
    async fn replace(
        &self,
        scope: Option<Uuid>,
        workouts: &[WorkoutRow],
        sets: &[SetRow],
    ) -> SyncResult<()> {
        let workout_rows: Vec<WorkoutProjectionRow> =
            workouts.iter().map(WorkoutProjectionRow::from).collect();
        let set_rows: Vec<SetProjectionRow> = sets.iter().map(SetProjectionRow::from).collect();

        let mut conn = self.get_connection()?;
        conn.transaction(|conn| {
            match scope {
                Some(user_id) => {
                    // Sets first: their scope is derived through the workouts
                    // table that is about to be truncated.
                    let scoped_workouts = workouts_projection::table
                        .filter(workouts_projection::user_id.eq(user_id))
                        .select(workouts_projection::workout_id);
                    diesel::delete(
                        sets_projection::table
                            .filter(sets_projection::workout_id.eq_any(scoped_workouts)),
                    )
                    .execute(conn)?;
                    diesel::delete(
                        workouts_projection::table
                            .filter(workouts_projection::user_id.eq(user_id)),
                    )
                    .execute(conn)?;
                }
                None => {
                    diesel::delete(sets_projection::table).execute(conn)?;
                    diesel::delete(workouts_projection::table).execute(conn)?;
                }
            }

            diesel::insert_into(workouts_projection::table)
                .values(&workout_rows)
                .execute(conn)?;
            diesel::insert_into(sets_projection::table)
                .values(&set_rows)
                .execute(conn)?;
            Ok::<_, diesel::result::Error>(())
        })
        .map_err(|e| SyncError::StorageFault {
            message: format!("failed to swap projections: {}", e),
        })
    }

    async fn workouts_for_user(&self, user_id: Uuid) -> SyncResult<Vec<WorkoutRow>> {
        let mut conn = self.get_connection()?;
        let rows: Vec<WorkoutProjectionRow> = workouts_projection::table
            .filter(workouts_projection::user_id.eq(user_id))
            .order(workouts_projection::started_at.asc())
            .load(&mut conn)
            .map_err(|e| SyncError::StorageFault {
                message: format!("failed to load workouts projection: {}", e),
            })?;
        Ok(rows.into_iter().map(WorkoutRow::from).collect())
    }

    async fn sets_for_workout(&self, workout_id: Uuid) -> SyncResult<Vec<SetRow>> {
        let mut conn = self.get_connection()?;
        let rows: Vec<SetProjectionRow> = sets_projection::table
            .filter(sets_projection::workout_id.eq(workout_id))
            .order(sets_projection::completed_at.asc())
            .load(&mut conn)
            .map_err(|e| SyncError::StorageFault {
                message: format!("failed to load sets projection: {}", e),
            })?;
        Ok(rows.into_iter().map(SetRow::from).collect())
    }
}
