//! Single-flight end-to-end sync driver.
//!
//! At most one sync attempt runs per coordinator at any moment; the guard is
//! a semaphore bounded at one permit, and the `syncing` status in the queue
//! backs it up across process restarts. The server is the source of truth for
//! whether a batch landed - on any transport failure the events simply return
//! to `pending` and the next attempt resubmits them, with server-side
//! idempotency absorbing duplicates.

use std::sync::Arc;

use tokio::sync::Semaphore;
use uuid::Uuid;

use repsync_core::{SyncError, SyncRequest, SyncResult, WireEvent};

use crate::queue::EventQueue;
use crate::transport::SyncTransport;

/// Result of one sync attempt.
///
/// The two messages here are the only outcomes a user ever observes; retry
/// accounting stays internal to the queue.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncOutcome {
    pub synced: usize,
    pub failed: usize,
    pub ok: bool,
    pub message: String,
}

impl SyncOutcome {
    fn synced(count: usize, rejected: usize) -> Self {
        Self {
            synced: count,
            failed: rejected,
            ok: true,
            message: format!("synced ({} events)", count),
        }
    }

    fn deferred(count: usize) -> Self {
        Self {
            synced: 0,
            failed: count,
            ok: false,
            message: "saved locally; will sync when online".to_string(),
        }
    }

    fn in_progress() -> Self {
        Self {
            synced: 0,
            failed: 0,
            ok: false,
            message: "sync already in progress".to_string(),
        }
    }
}

pub struct SyncCoordinator {
    queue: Arc<dyn EventQueue>,
    transport: Arc<dyn SyncTransport>,
    in_flight: Semaphore,
}

impl SyncCoordinator {
    pub fn new(queue: Arc<dyn EventQueue>, transport: Arc<dyn SyncTransport>) -> Self {
        Self {
            queue,
            transport,
            in_flight: Semaphore::new(1),
        }
    }

    /// Restart recovery: rows a crashed process left in `syncing` are
    /// ambiguous and must be restored to `pending` before the next attempt.
    pub async fn recover(&self) -> SyncResult<usize> {
        self.queue.recover_inflight().await
    }

    /// Drive one end-to-end sync for the identity pair.
    ///
    /// Storage faults propagate without touching queue state; transport
    /// failures are absorbed into retry accounting. A concurrent caller gets
    /// an immediate `ok = false` outcome and no side effects.
    pub async fn sync(&self, device_id: Uuid, user_id: Uuid) -> SyncResult<SyncOutcome> {
        let _permit = match self.in_flight.try_acquire() {
            Ok(permit) => permit,
            Err(_) => {
                tracing::debug!(%device_id, "sync attempt rejected: {}", SyncError::SyncInProgress);
                return Ok(SyncOutcome::in_progress());
            }
        };

        let pending = self.queue.get_pending(device_id, user_id).await?;
        if pending.is_empty() {
            return Ok(SyncOutcome::synced(0, 0));
        }

        let event_ids: Vec<Uuid> = pending.iter().map(|e| e.record.event_id).collect();

        // Hide the batch from any concurrent caller before going on the wire.
        self.queue.mark_syncing(&event_ids).await?;

        let request = SyncRequest {
            device_id,
            user_id,
            events: pending
                .iter()
                .map(|e| WireEvent::from_record(&e.record))
                .collect(),
        };

        match self.transport.submit_batch(&request).await {
            Ok(response) => {
                let rejected: Vec<Uuid> = response.rejected_event_ids.clone();
                let accepted: Vec<Uuid> = event_ids
                    .iter()
                    .copied()
                    .filter(|id| !rejected.contains(id))
                    .collect();

                self.queue.mark_synced(&accepted).await?;
                if !rejected.is_empty() {
                    // Rejected events stay local under retry accounting so the
                    // producer can correct and resubmit them.
                    self.queue.mark_failed(&rejected).await?;
                    tracing::warn!(
                        rejected = rejected.len(),
                        "server rejected events from batch"
                    );
                }

                tracing::info!(
                    synced = accepted.len(),
                    last_acked = ?response.ack_cursor.last_acked_sequence,
                    "sync batch acknowledged"
                );
                Ok(SyncOutcome::synced(accepted.len(), rejected.len()))
            }
            Err(error) if error.is_transport() => {
                self.queue.mark_failed(&event_ids).await?;
                tracing::warn!(count = event_ids.len(), "sync deferred: {}", error);
                Ok(SyncOutcome::deferred(event_ids.len()))
            }
            Err(error) => {
                // Batch-level rejection or a malformed response: nothing is
                // known to have landed, so restore retry eligibility and
                // surface the error.
                self.queue.mark_failed(&event_ids).await?;
                Err(error)
            }
        }
    }
}
