//! PostgreSQL-backed store tests.
//!
//! These need a reachable database; set DATABASE_URL and run with
//! `cargo test -- --ignored`.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use repsync_api::db::init_pool;
use repsync_api::projections::{PostgresProjectionStore, ProjectionRebuilder, ProjectionStore};
use repsync_api::store::{EventLog, PostgresEventLog};
use repsync_core::payload::{WorkoutEndedPayload, WorkoutStartedPayload};
use repsync_core::{EventPayload, EventRecord};

fn postgres_fixture() -> (Arc<PostgresEventLog>, Arc<PostgresProjectionStore>) {
    let pool = Arc::new(init_pool().expect("DATABASE_URL must point at a test database"));
    let log = Arc::new(PostgresEventLog::new(pool.clone()));
    log.ensure_schema().unwrap();
    let store = Arc::new(PostgresProjectionStore::new(pool));
    store.ensure_schema().unwrap();
    (log, store)
}

#[tokio::test]
#[ignore] // Requires a PostgreSQL database
async fn append_is_idempotent_on_event_id() {
    let (log, _store) = postgres_fixture();
    let user_id = Uuid::new_v4();
    let device_id = Uuid::new_v4();

    let record = EventRecord::from_payload(
        &EventPayload::WorkoutStarted(WorkoutStartedPayload {
            workout_id: Uuid::new_v4(),
            started_at: Utc::now(),
        }),
        user_id,
        device_id,
        1,
    )
    .unwrap();

    let first = log.append_batch(&[record.clone()]).await.unwrap();
    let second = log.append_batch(&[record.clone()]).await.unwrap();
    assert_eq!(first, 1);
    assert_eq!(second, 0);

    let scoped = log.events_ordered(Some(user_id)).await.unwrap();
    assert_eq!(scoped.len(), 1);
    assert_eq!(scoped[0].event_id, record.event_id);
}

#[tokio::test]
#[ignore] // Requires a PostgreSQL database
async fn rebuild_folds_logged_workout() {
    let (log, store) = postgres_fixture();
    let user_id = Uuid::new_v4();
    let device_id = Uuid::new_v4();
    let workout_id = Uuid::new_v4();

    log.append_batch(&[
        EventRecord::from_payload(
            &EventPayload::WorkoutStarted(WorkoutStartedPayload {
                workout_id,
                started_at: Utc::now(),
            }),
            user_id,
            device_id,
            1,
        )
        .unwrap(),
        EventRecord::from_payload(
            &EventPayload::WorkoutEnded(WorkoutEndedPayload {
                workout_id,
                ended_at: Utc::now(),
            }),
            user_id,
            device_id,
            2,
        )
        .unwrap(),
    ])
    .await
    .unwrap();

    let rebuilder = ProjectionRebuilder::new(log, store.clone());
    let summary = rebuilder.rebuild(Some(user_id)).await.unwrap();
    assert_eq!(summary.workouts_written, 1);

    let workouts = store.workouts_for_user(user_id).await.unwrap();
    assert_eq!(workouts.len(), 1);
    assert_eq!(workouts[0].workout_id, workout_id);
}
