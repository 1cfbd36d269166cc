//! Read models as deterministic folds of the event log.
//!
//! Projections contain nothing the log does not; they exist so queries do not
//! replay. A rebuild streams the scoped log in canonical order, folds it in
//! memory, and swaps the result in atomically - readers see either the old or
//! the new tables, never a partial state, and any error leaves the previous
//! tables intact.

pub mod memory;
pub mod postgres;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use repsync_core::{EventPayload, EventRecord, SyncError, SyncResult};

use crate::store::EventLog;

pub use memory::InMemoryProjectionStore;
pub use postgres::PostgresProjectionStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkoutStatus {
    InProgress,
    Completed,
    Cancelled,
}

impl From<String> for WorkoutStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "in_progress" => WorkoutStatus::InProgress,
            "completed" => WorkoutStatus::Completed,
            "cancelled" => WorkoutStatus::Cancelled,
            _ => WorkoutStatus::InProgress,
        }
    }
}

impl From<WorkoutStatus> for String {
    fn from(status: WorkoutStatus) -> Self {
        match status {
            WorkoutStatus::InProgress => "in_progress".to_string(),
            WorkoutStatus::Completed => "completed".to_string(),
            WorkoutStatus::Cancelled => "cancelled".to_string(),
        }
    }
}

/// One row of `workouts_projection`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkoutRow {
    pub workout_id: Uuid,
    pub user_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub status: WorkoutStatus,
}

/// One row of `sets_projection`. Volume is computed by the reader, not stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetRow {
    pub set_id: Uuid,
    pub workout_id: Uuid,
    pub exercise_id: Uuid,
    pub reps: i32,
    pub weight: f64,
    pub completed_at: DateTime<Utc>,
}

/// Output of one fold over the log.
#[derive(Debug, Clone, Default)]
pub struct ReducedProjections {
    pub workouts: Vec<WorkoutRow>,
    pub sets: Vec<SetRow>,
    pub skipped_events: usize,
}

/// Result of a completed rebuild.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RebuildSummary {
    pub workouts_written: usize,
    pub sets_written: usize,
    pub skipped_events: usize,
    pub duration_ms: u64,
}

/// Fold events (already in canonical order) into projection rows.
///
/// Events with an unknown tag are skipped and counted; the log stays forward
/// compatible with projectors that do not understand them yet. Output row
/// order is keyed by id, so the same log always reduces to identical tables.
pub fn reduce(events: &[EventRecord]) -> ReducedProjections {
    let mut workouts: BTreeMap<Uuid, WorkoutRow> = BTreeMap::new();
    let mut sets: BTreeMap<Uuid, SetRow> = BTreeMap::new();
    let mut skipped_events = 0;

    for event in events {
        let payload = match event.typed_payload() {
            Ok(payload) => payload,
            Err(SyncError::EventTypeUnknown { event_type }) => {
                tracing::warn!(event_id = %event.event_id, %event_type, "skipping unknown event type during fold");
                skipped_events += 1;
                continue;
            }
            Err(error) => {
                tracing::warn!(event_id = %event.event_id, "skipping malformed logged event: {}", error);
                skipped_events += 1;
                continue;
            }
        };

        match payload {
            EventPayload::WorkoutStarted(p) => {
                workouts.insert(
                    p.workout_id,
                    WorkoutRow {
                        workout_id: p.workout_id,
                        user_id: event.user_id,
                        started_at: p.started_at,
                        ended_at: None,
                        status: WorkoutStatus::InProgress,
                    },
                );
            }
            EventPayload::WorkoutEnded(p) => {
                if let Some(workout) = workouts.get_mut(&p.workout_id) {
                    workout.ended_at = Some(p.ended_at);
                    workout.status = WorkoutStatus::Completed;
                }
            }
            EventPayload::WorkoutCancelled(p) => {
                if let Some(workout) = workouts.get_mut(&p.workout_id) {
                    workout.status = WorkoutStatus::Cancelled;
                }
            }
            // Consumed by the client and the coaching collaborator only.
            EventPayload::ExerciseAdded(_) => {}
            EventPayload::SetCompleted(p) => {
                sets.insert(
                    p.set_id,
                    SetRow {
                        set_id: p.set_id,
                        workout_id: p.workout_id,
                        exercise_id: p.exercise_id,
                        reps: p.reps,
                        weight: p.weight,
                        completed_at: p.completed_at,
                    },
                );
            }
            EventPayload::SetUpdated(p) => {
                if let Some(set) = sets.get_mut(&p.set_id) {
                    if let Some(reps) = p.reps {
                        set.reps = reps;
                    }
                    if let Some(weight) = p.weight {
                        set.weight = weight;
                    }
                    if let Some(completed_at) = p.completed_at {
                        set.completed_at = completed_at;
                    }
                }
            }
            EventPayload::SetDeleted(p) => {
                sets.remove(&p.set_id);
            }
        }
    }

    ReducedProjections {
        workouts: workouts.into_values().collect(),
        sets: sets.into_values().collect(),
        skipped_events,
    }
}

/// Swappable storage for the projection tables.
#[async_trait]
pub trait ProjectionStore: Send + Sync {
    /// Replace the projection tables for the scope in one transaction:
    /// truncate the scoped rows, then write the new fold.
    async fn replace(
        &self,
        scope: Option<Uuid>,
        workouts: &[WorkoutRow],
        sets: &[SetRow],
    ) -> SyncResult<()>;

    async fn workouts_for_user(&self, user_id: Uuid) -> SyncResult<Vec<WorkoutRow>>;

    async fn sets_for_workout(&self, workout_id: Uuid) -> SyncResult<Vec<SetRow>>;
}

/// Rebuilds the projection tables from the log.
pub struct ProjectionRebuilder {
    log: Arc<dyn EventLog>,
    store: Arc<dyn ProjectionStore>,
}

impl ProjectionRebuilder {
    pub fn new(log: Arc<dyn EventLog>, store: Arc<dyn ProjectionStore>) -> Self {
        Self { log, store }
    }

    /// Rebuild the projections, optionally scoped to one user.
    ///
    /// Runs foreground when triggered manually and in a spawned task after
    /// significant ingests. Errors roll the swap back and are never silent.
    pub async fn rebuild(&self, scope: Option<Uuid>) -> SyncResult<RebuildSummary> {
        let start = Instant::now();

        let events = self.log.events_ordered(scope).await?;
        let reduced = reduce(&events);
        self.store
            .replace(scope, &reduced.workouts, &reduced.sets)
            .await?;

        let summary = RebuildSummary {
            workouts_written: reduced.workouts.len(),
            sets_written: reduced.sets.len(),
            skipped_events: reduced.skipped_events,
            duration_ms: start.elapsed().as_millis() as u64,
        };
        tracing::info!(
            scope = ?scope,
            workouts = summary.workouts_written,
            sets = summary.sets_written,
            skipped = summary.skipped_events,
            duration_ms = summary.duration_ms,
            "rebuilt projections"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryEventLog;
    use repsync_core::payload::{
        SetCompletedPayload, SetDeletedPayload, SetUpdatedPayload, WorkoutCancelledPayload,
        WorkoutEndedPayload, WorkoutStartedPayload,
    };
    use serde_json::json;

    struct EventBuilder {
        user_id: Uuid,
        device_id: Uuid,
        sequence: i64,
    }

    impl EventBuilder {
        fn new(user_id: Uuid, device_id: Uuid) -> Self {
            Self {
                user_id,
                device_id,
                sequence: 0,
            }
        }

        fn event(&mut self, payload: EventPayload) -> EventRecord {
            self.sequence += 1;
            EventRecord::from_payload(&payload, self.user_id, self.device_id, self.sequence)
                .unwrap()
        }
    }

    fn timestamp(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    #[test]
    fn single_workout_round_trip_folds_to_expected_rows() {
        let user_id = Uuid::new_v4();
        let workout_id = Uuid::new_v4();
        let set_id = Uuid::new_v4();
        let mut builder = EventBuilder::new(user_id, Uuid::new_v4());

        let t0 = timestamp("2024-03-01T09:00:00Z");
        let t1 = timestamp("2024-03-01T09:05:00Z");
        let t2 = timestamp("2024-03-01T09:45:00Z");

        let events = vec![
            builder.event(EventPayload::WorkoutStarted(WorkoutStartedPayload {
                workout_id,
                started_at: t0,
            })),
            builder.event(EventPayload::SetCompleted(SetCompletedPayload {
                workout_id,
                exercise_id: Uuid::new_v4(),
                set_id,
                reps: 10,
                weight: 100.0,
                completed_at: t1,
            })),
            builder.event(EventPayload::WorkoutEnded(WorkoutEndedPayload {
                workout_id,
                ended_at: t2,
            })),
        ];

        let reduced = reduce(&events);
        assert_eq!(reduced.workouts.len(), 1);
        assert_eq!(reduced.sets.len(), 1);
        assert_eq!(reduced.skipped_events, 0);

        let workout = &reduced.workouts[0];
        assert_eq!(workout.workout_id, workout_id);
        assert_eq!(workout.user_id, user_id);
        assert_eq!(workout.started_at, t0);
        assert_eq!(workout.ended_at, Some(t2));
        assert_eq!(workout.status, WorkoutStatus::Completed);

        let set = &reduced.sets[0];
        assert_eq!(set.set_id, set_id);
        assert_eq!(set.workout_id, workout_id);
        assert_eq!(set.reps, 10);
        assert_eq!(set.weight, 100.0);
    }

    #[test]
    fn set_update_and_delete_fold_in_order() {
        let workout_id = Uuid::new_v4();
        let kept_set = Uuid::new_v4();
        let dropped_set = Uuid::new_v4();
        let mut builder = EventBuilder::new(Uuid::new_v4(), Uuid::new_v4());

        let completed = |set_id| {
            EventPayload::SetCompleted(SetCompletedPayload {
                workout_id,
                exercise_id: Uuid::new_v4(),
                set_id,
                reps: 8,
                weight: 60.0,
                completed_at: timestamp("2024-03-01T10:00:00Z"),
            })
        };

        let events = vec![
            builder.event(EventPayload::WorkoutStarted(WorkoutStartedPayload {
                workout_id,
                started_at: timestamp("2024-03-01T09:55:00Z"),
            })),
            builder.event(completed(kept_set)),
            builder.event(completed(dropped_set)),
            builder.event(EventPayload::SetUpdated(SetUpdatedPayload {
                set_id: kept_set,
                reps: Some(12),
                weight: None,
                completed_at: None,
            })),
            builder.event(EventPayload::SetDeleted(SetDeletedPayload {
                set_id: dropped_set,
            })),
        ];

        let reduced = reduce(&events);
        assert_eq!(reduced.sets.len(), 1);
        assert_eq!(reduced.sets[0].set_id, kept_set);
        assert_eq!(reduced.sets[0].reps, 12);
        // Untouched fields survive the partial update.
        assert_eq!(reduced.sets[0].weight, 60.0);
    }

    #[test]
    fn cancellation_overrides_progress() {
        let workout_id = Uuid::new_v4();
        let mut builder = EventBuilder::new(Uuid::new_v4(), Uuid::new_v4());
        let events = vec![
            builder.event(EventPayload::WorkoutStarted(WorkoutStartedPayload {
                workout_id,
                started_at: timestamp("2024-03-02T08:00:00Z"),
            })),
            builder.event(EventPayload::WorkoutCancelled(WorkoutCancelledPayload {
                workout_id,
            })),
        ];

        let reduced = reduce(&events);
        assert_eq!(reduced.workouts[0].status, WorkoutStatus::Cancelled);
        assert_eq!(reduced.workouts[0].ended_at, None);
    }

    #[test]
    fn unknown_event_types_are_skipped_and_counted() {
        let mut builder = EventBuilder::new(Uuid::new_v4(), Uuid::new_v4());
        let known = builder.event(EventPayload::WorkoutStarted(WorkoutStartedPayload {
            workout_id: Uuid::new_v4(),
            started_at: timestamp("2024-03-02T08:00:00Z"),
        }));
        let unknown = EventRecord {
            event_id: Uuid::new_v4(),
            event_type: "HeartRateSampled".to_string(),
            payload: json!({"bpm": 162}),
            user_id: known.user_id,
            device_id: known.device_id,
            sequence_number: 2,
            correlation_id: None,
            created_at: Utc::now(),
        };

        let reduced = reduce(&[known, unknown]);
        assert_eq!(reduced.workouts.len(), 1);
        assert_eq!(reduced.skipped_events, 1);
    }

    #[test]
    fn exercise_added_is_a_projection_no_op() {
        let mut builder = EventBuilder::new(Uuid::new_v4(), Uuid::new_v4());
        let events = vec![builder.event(EventPayload::ExerciseAdded(
            repsync_core::payload::ExerciseAddedPayload {
                workout_id: Uuid::new_v4(),
                exercise_id: Uuid::new_v4(),
                exercise_name: "Back Squat".to_string(),
            },
        ))];

        let reduced = reduce(&events);
        assert!(reduced.workouts.is_empty());
        assert!(reduced.sets.is_empty());
        assert_eq!(reduced.skipped_events, 0);
    }

    #[tokio::test]
    async fn arrival_order_does_not_matter_when_device_order_holds() {
        // Two devices interleaved three different ways; the fold re-sorts by
        // (device_id, sequence_number), so all three logs reduce identically.
        let user_id = Uuid::new_v4();
        let device_a = Uuid::new_v4();
        let device_b = Uuid::new_v4();
        let workout_id = Uuid::new_v4();

        let mut a = EventBuilder::new(user_id, device_a);
        let mut b = EventBuilder::new(user_id, device_b);

        let a1 = a.event(EventPayload::WorkoutStarted(WorkoutStartedPayload {
            workout_id,
            started_at: timestamp("2024-03-03T07:00:00Z"),
        }));
        let a2 = a.event(EventPayload::SetCompleted(SetCompletedPayload {
            workout_id,
            exercise_id: Uuid::new_v4(),
            set_id: Uuid::new_v4(),
            reps: 5,
            weight: 140.0,
            completed_at: timestamp("2024-03-03T07:10:00Z"),
        }));
        let b1 = b.event(EventPayload::SetCompleted(SetCompletedPayload {
            workout_id,
            exercise_id: Uuid::new_v4(),
            set_id: Uuid::new_v4(),
            reps: 3,
            weight: 150.0,
            completed_at: timestamp("2024-03-03T07:12:00Z"),
        }));
        let a3 = a.event(EventPayload::WorkoutEnded(WorkoutEndedPayload {
            workout_id,
            ended_at: timestamp("2024-03-03T07:40:00Z"),
        }));

        let arrivals: Vec<Vec<EventRecord>> = vec![
            vec![a1.clone(), a2.clone(), b1.clone(), a3.clone()],
            vec![b1.clone(), a1.clone(), a2.clone(), a3.clone()],
            vec![a1.clone(), b1.clone(), a2.clone(), a3.clone()],
        ];

        let mut folds = Vec::new();
        for arrival in arrivals {
            let log = InMemoryEventLog::new();
            log.append_batch(&arrival).await.unwrap();
            let ordered = log.events_ordered(None).await.unwrap();
            let reduced = reduce(&ordered);
            folds.push((reduced.workouts, reduced.sets));
        }

        assert_eq!(folds[0], folds[1]);
        assert_eq!(folds[1], folds[2]);
    }

    #[tokio::test]
    async fn rebuild_writes_scoped_tables() {
        let user_a = Uuid::new_v4();
        let user_b = Uuid::new_v4();
        let workout_a = Uuid::new_v4();
        let workout_b = Uuid::new_v4();

        let log = Arc::new(InMemoryEventLog::new());
        let mut builder_a = EventBuilder::new(user_a, Uuid::new_v4());
        let mut builder_b = EventBuilder::new(user_b, Uuid::new_v4());
        log.append_batch(&[
            builder_a.event(EventPayload::WorkoutStarted(WorkoutStartedPayload {
                workout_id: workout_a,
                started_at: timestamp("2024-03-04T06:00:00Z"),
            })),
            builder_b.event(EventPayload::WorkoutStarted(WorkoutStartedPayload {
                workout_id: workout_b,
                started_at: timestamp("2024-03-04T06:30:00Z"),
            })),
        ])
        .await
        .unwrap();

        let store = Arc::new(InMemoryProjectionStore::new());
        let rebuilder = ProjectionRebuilder::new(log, store.clone());

        let summary = rebuilder.rebuild(Some(user_a)).await.unwrap();
        assert_eq!(summary.workouts_written, 1);
        assert_eq!(summary.sets_written, 0);

        assert_eq!(store.workouts_for_user(user_a).await.unwrap().len(), 1);
        // The other user's scope is untouched by a scoped rebuild.
        assert!(store.workouts_for_user(user_b).await.unwrap().is_empty());

        let summary = rebuilder.rebuild(None).await.unwrap();
        assert_eq!(summary.workouts_written, 2);
        assert_eq!(store.workouts_for_user(user_b).await.unwrap().len(), 1);
    }
}
