//! Behavior suite run against every queue backend.

use chrono::Utc;
use uuid::Uuid;

use repsync_core::payload::WorkoutStartedPayload;
use repsync_core::{EventPayload, EventRecord};

use super::{EventQueue, InMemoryEventQueue, QueueStatus, MAX_RETRY_COUNT};
use super::sqlite::{SqliteEventQueue, SqliteQueueConfig};

fn sample_record(user_id: Uuid, device_id: Uuid, sequence_number: i64) -> EventRecord {
    let payload = EventPayload::WorkoutStarted(WorkoutStartedPayload {
        workout_id: Uuid::new_v4(),
        started_at: Utc::now(),
    });
    EventRecord::from_payload(&payload, user_id, device_id, sequence_number).unwrap()
}

fn ids(records: &[EventRecord]) -> Vec<Uuid> {
    records.iter().map(|r| r.event_id).collect()
}

mod suite {
    use super::*;

    pub async fn enqueue_round_trip(queue: &dyn EventQueue) {
        let user_id = Uuid::new_v4();
        let device_id = Uuid::new_v4();
        // Enqueue out of order; get_pending must sort by sequence.
        let records = vec![
            sample_record(user_id, device_id, 3),
            sample_record(user_id, device_id, 1),
            sample_record(user_id, device_id, 2),
        ];
        queue.enqueue(&records).await.unwrap();

        let pending = queue.get_pending(device_id, user_id).await.unwrap();
        assert_eq!(pending.len(), 3);
        let sequences: Vec<i64> = pending.iter().map(|e| e.record.sequence_number).collect();
        assert_eq!(sequences, vec![1, 2, 3]);
        assert!(pending.iter().all(|e| e.status == QueueStatus::Pending));
        assert!(pending.iter().all(|e| e.retry_count == 0));
    }

    pub async fn enqueue_is_idempotent(queue: &dyn EventQueue) {
        let user_id = Uuid::new_v4();
        let device_id = Uuid::new_v4();
        let records = vec![sample_record(user_id, device_id, 1)];

        queue.enqueue(&records).await.unwrap();
        queue.enqueue(&records).await.unwrap();
        queue.enqueue(&records).await.unwrap();

        let pending = queue.get_pending(device_id, user_id).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(queue.stats().await.unwrap().total(), 1);
    }

    pub async fn re_enqueue_preserves_status_fields(queue: &dyn EventQueue) {
        let user_id = Uuid::new_v4();
        let device_id = Uuid::new_v4();
        let records = vec![sample_record(user_id, device_id, 1)];

        queue.enqueue(&records).await.unwrap();
        queue.mark_syncing(&ids(&records)).await.unwrap();

        // A duplicate insert while the row is in flight must not reset it.
        queue.enqueue(&records).await.unwrap();
        assert!(queue.get_pending(device_id, user_id).await.unwrap().is_empty());
        assert_eq!(queue.stats().await.unwrap().syncing, 1);
    }

    pub async fn mark_syncing_hides_events(queue: &dyn EventQueue) {
        let user_id = Uuid::new_v4();
        let device_id = Uuid::new_v4();
        let records = vec![
            sample_record(user_id, device_id, 1),
            sample_record(user_id, device_id, 2),
        ];
        queue.enqueue(&records).await.unwrap();
        queue.mark_syncing(&[records[0].event_id]).await.unwrap();

        let pending = queue.get_pending(device_id, user_id).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].record.event_id, records[1].event_id);
    }

    pub async fn mark_synced_deletes_rows(queue: &dyn EventQueue) {
        let user_id = Uuid::new_v4();
        let device_id = Uuid::new_v4();
        let records = vec![sample_record(user_id, device_id, 1)];
        queue.enqueue(&records).await.unwrap();
        queue.mark_syncing(&ids(&records)).await.unwrap();
        queue.mark_synced(&ids(&records)).await.unwrap();

        assert_eq!(queue.stats().await.unwrap().total(), 0);
    }

    pub async fn mark_failed_round_trip(queue: &dyn EventQueue) {
        let user_id = Uuid::new_v4();
        let device_id = Uuid::new_v4();
        let records = vec![sample_record(user_id, device_id, 1)];
        queue.enqueue(&records).await.unwrap();
        queue.mark_syncing(&ids(&records)).await.unwrap();
        queue.mark_failed(&ids(&records)).await.unwrap();

        let pending = queue.get_pending(device_id, user_id).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].status, QueueStatus::Pending);
        assert_eq!(pending[0].retry_count, 1);
    }

    pub async fn retry_budget_parks_in_failed(queue: &dyn EventQueue) {
        let user_id = Uuid::new_v4();
        let device_id = Uuid::new_v4();
        let records = vec![
            sample_record(user_id, device_id, 1),
            sample_record(user_id, device_id, 2),
        ];
        queue.enqueue(&records).await.unwrap();

        for attempt in 1..=MAX_RETRY_COUNT {
            let pending = queue.get_pending(device_id, user_id).await.unwrap();
            if attempt < MAX_RETRY_COUNT {
                assert_eq!(pending.len(), 2, "events must stay retryable before strike {}", attempt);
            }
            queue.mark_syncing(&ids(&records)).await.unwrap();
            queue.mark_failed(&ids(&records)).await.unwrap();
        }

        let stats = queue.stats().await.unwrap();
        assert_eq!(stats.failed, 2);
        assert_eq!(stats.pending, 0);
        assert!(queue.get_pending(device_id, user_id).await.unwrap().is_empty());
    }

    pub async fn reset_failed_restores_scoped_user(queue: &dyn EventQueue) {
        let device_id = Uuid::new_v4();
        let user_a = Uuid::new_v4();
        let user_b = Uuid::new_v4();
        let records_a = vec![sample_record(user_a, device_id, 1)];
        let records_b = vec![sample_record(user_b, device_id, 2)];
        queue.enqueue(&records_a).await.unwrap();
        queue.enqueue(&records_b).await.unwrap();

        for _ in 0..MAX_RETRY_COUNT {
            queue.mark_failed(&ids(&records_a)).await.unwrap();
            queue.mark_failed(&ids(&records_b)).await.unwrap();
        }
        assert_eq!(queue.stats().await.unwrap().failed, 2);

        let restored = queue.reset_failed(Some(user_a)).await.unwrap();
        assert_eq!(restored, 1);

        let pending_a = queue.get_pending(device_id, user_a).await.unwrap();
        assert_eq!(pending_a.len(), 1);
        assert_eq!(pending_a[0].retry_count, 0);
        assert_eq!(queue.stats().await.unwrap().failed, 1);
    }

    pub async fn rewrite_user_spans_all_statuses(queue: &dyn EventQueue) {
        let device_id = Uuid::new_v4();
        let old_user = Uuid::new_v4();
        let new_user = Uuid::new_v4();

        let pending = sample_record(old_user, device_id, 1);
        let syncing = sample_record(old_user, device_id, 2);
        let failed = sample_record(old_user, device_id, 3);
        queue
            .enqueue(&[pending.clone(), syncing.clone(), failed.clone()])
            .await
            .unwrap();
        queue.mark_syncing(&[syncing.event_id]).await.unwrap();
        for _ in 0..MAX_RETRY_COUNT {
            queue.mark_failed(&[failed.event_id]).await.unwrap();
        }

        let changed = queue.rewrite_user_id(old_user, new_user).await.unwrap();
        assert_eq!(changed, 3);
        assert!(queue.get_pending(device_id, old_user).await.unwrap().is_empty());

        let reattributed = queue.get_pending(device_id, new_user).await.unwrap();
        let reattributed_ids: Vec<Uuid> = reattributed.iter().map(|e| e.record.event_id).collect();
        assert!(reattributed_ids.contains(&pending.event_id));

        // The parked row moved too: a reset scoped to the old identity finds
        // nothing, one scoped to the new identity releases it to pending.
        assert_eq!(queue.reset_failed(Some(old_user)).await.unwrap(), 0);
        assert_eq!(queue.reset_failed(Some(new_user)).await.unwrap(), 1);
        let released = queue.get_pending(device_id, new_user).await.unwrap();
        assert!(released
            .iter()
            .any(|e| e.record.event_id == failed.event_id));
    }

    pub async fn recover_inflight_restores_pending(queue: &dyn EventQueue) {
        let user_id = Uuid::new_v4();
        let device_id = Uuid::new_v4();
        let records = vec![
            sample_record(user_id, device_id, 1),
            sample_record(user_id, device_id, 2),
        ];
        queue.enqueue(&records).await.unwrap();
        queue.mark_syncing(&ids(&records)).await.unwrap();

        // Simulated crash between mark_syncing and the acknowledgment.
        let recovered = queue.recover_inflight().await.unwrap();
        assert_eq!(recovered, 2);

        let pending = queue.get_pending(device_id, user_id).await.unwrap();
        assert_eq!(pending.len(), 2);
        assert!(pending.iter().all(|e| e.retry_count == 0));
    }

    pub async fn max_sequence_tracks_device(queue: &dyn EventQueue) {
        let user_id = Uuid::new_v4();
        let device_a = Uuid::new_v4();
        let device_b = Uuid::new_v4();
        queue
            .enqueue(&[
                sample_record(user_id, device_a, 5),
                sample_record(user_id, device_a, 9),
                sample_record(user_id, device_b, 2),
            ])
            .await
            .unwrap();

        assert_eq!(queue.max_sequence(device_a).await.unwrap(), Some(9));
        assert_eq!(queue.max_sequence(device_b).await.unwrap(), Some(2));
        assert_eq!(queue.max_sequence(Uuid::new_v4()).await.unwrap(), None);
    }
}

macro_rules! queue_backend_tests {
    ($backend:ident, $make:expr) => {
        mod $backend {
            use super::*;

            #[tokio::test]
            async fn enqueue_round_trip() {
                let (queue, _guard) = $make;
                suite::enqueue_round_trip(&queue).await;
            }

            #[tokio::test]
            async fn enqueue_is_idempotent() {
                let (queue, _guard) = $make;
                suite::enqueue_is_idempotent(&queue).await;
            }

            #[tokio::test]
            async fn re_enqueue_preserves_status_fields() {
                let (queue, _guard) = $make;
                suite::re_enqueue_preserves_status_fields(&queue).await;
            }

            #[tokio::test]
            async fn mark_syncing_hides_events() {
                let (queue, _guard) = $make;
                suite::mark_syncing_hides_events(&queue).await;
            }

            #[tokio::test]
            async fn mark_synced_deletes_rows() {
                let (queue, _guard) = $make;
                suite::mark_synced_deletes_rows(&queue).await;
            }

            #[tokio::test]
            async fn mark_failed_round_trip() {
                let (queue, _guard) = $make;
                suite::mark_failed_round_trip(&queue).await;
            }

            #[tokio::test]
            async fn retry_budget_parks_in_failed() {
                let (queue, _guard) = $make;
                suite::retry_budget_parks_in_failed(&queue).await;
            }

            #[tokio::test]
            async fn reset_failed_restores_scoped_user() {
                let (queue, _guard) = $make;
                suite::reset_failed_restores_scoped_user(&queue).await;
            }

            #[tokio::test]
            async fn rewrite_user_spans_all_statuses() {
                let (queue, _guard) = $make;
                suite::rewrite_user_spans_all_statuses(&queue).await;
            }

            #[tokio::test]
            async fn recover_inflight_restores_pending() {
                let (queue, _guard) = $make;
                suite::recover_inflight_restores_pending(&queue).await;
            }

            #[tokio::test]
            async fn max_sequence_tracks_device() {
                let (queue, _guard) = $make;
                suite::max_sequence_tracks_device(&queue).await;
            }
        }
    };
}

fn memory_backend() -> (InMemoryEventQueue, ()) {
    (InMemoryEventQueue::new(), ())
}

fn sqlite_backend() -> (SqliteEventQueue, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let config = SqliteQueueConfig {
        database_path: dir
            .path()
            .join("queue.db")
            .to_string_lossy()
            .into_owned(),
        ..SqliteQueueConfig::default()
    };
    (SqliteEventQueue::open(config).unwrap(), dir)
}

queue_backend_tests!(memory, memory_backend());
queue_backend_tests!(sqlite, sqlite_backend());
