//! In-memory projection tables for tests and demo deployments.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use repsync_core::SyncResult;

use super::{ProjectionStore, SetRow, WorkoutRow};

#[derive(Default)]
struct Tables {
    workouts: HashMap<Uuid, WorkoutRow>,
    sets: HashMap<Uuid, SetRow>,
}

/// Non-durable [`ProjectionStore`]; the single lock makes the swap atomic.
pub struct InMemoryProjectionStore {
    tables: RwLock<Tables>,
}

impl InMemoryProjectionStore {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
        }
    }
}

impl Default for InMemoryProjectionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProjectionStore for InMemoryProjectionStore {
    async fn replace(
        &self,
        scope: Option<Uuid>,
        workouts: &[WorkoutRow],
        sets: &[SetRow],
    ) -> SyncResult<()> {
        let mut tables = self.tables.write().await;
        match scope {
            Some(user_id) => {
                let scoped_workouts: Vec<Uuid> = tables
                    .workouts
                    .values()
                    .filter(|w| w.user_id == user_id)
                    .map(|w| w.workout_id)
                    .collect();
                tables
                    .sets
                    .retain(|_, set| !scoped_workouts.contains(&set.workout_id));
                tables.workouts.retain(|_, w| w.user_id != user_id);
            }
            None => {
                tables.workouts.clear();
                tables.sets.clear();
            }
        }

        for workout in workouts {
            tables.workouts.insert(workout.workout_id, workout.clone());
        }
        for set in sets {
            tables.sets.insert(set.set_id, set.clone());
        }
        Ok(())
    }

    async fn workouts_for_user(&self, user_id: Uuid) -> SyncResult<Vec<WorkoutRow>> {
        let tables = self.tables.read().await;
        let mut rows: Vec<WorkoutRow> = tables
            .workouts
            .values()
            .filter(|w| w.user_id == user_id)
            .cloned()
            .collect();
        rows.sort_by_key(|w| (w.started_at, w.workout_id));
        Ok(rows)
    }

    async fn sets_for_workout(&self, workout_id: Uuid) -> SyncResult<Vec<SetRow>> {
        let tables = self.tables.read().await;
        let mut rows: Vec<SetRow> = tables
            .sets
            .values()
            .filter(|s| s.workout_id == workout_id)
            .cloned()
            .collect();
        rows.sort_by_key(|s| (s.completed_at, s.set_id));
        Ok(rows)
    }
}
