//! Batch ingestion: validate, persist, acknowledge.

use std::sync::Arc;

use chrono::Utc;

use repsync_core::{
    validate_record, AckCursor, SyncError, SyncRequest, SyncResponse, SyncResult,
};

use crate::store::EventLog;

/// Configuration for the ingestion service.
#[derive(Debug, Clone)]
pub struct SyncServiceConfig {
    /// Hard cap on events per batch; an oversized batch is rejected whole.
    pub max_batch_size: usize,
}

impl Default for SyncServiceConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 10_000,
        }
    }
}

/// Accepts sync batches and turns them into idempotent log appends.
pub struct SyncService {
    log: Arc<dyn EventLog>,
    config: SyncServiceConfig,
}

impl SyncService {
    pub fn new(log: Arc<dyn EventLog>, config: SyncServiceConfig) -> Self {
        Self { log, config }
    }

    /// Process one batch.
    ///
    /// Events failing validation are rejected individually and listed in the
    /// response; the rest of the batch still lands. The whole valid set is
    /// appended in one transaction, so a storage fault aborts the batch and
    /// the client retries it in full - the `event_id` constraint makes the
    /// retry a no-op for whatever already landed.
    pub async fn ingest(&self, request: SyncRequest) -> SyncResult<SyncResponse> {
        if request.events.len() > self.config.max_batch_size {
            return Err(SyncError::ValidationRejected {
                message: format!(
                    "batch of {} events exceeds limit of {}",
                    request.events.len(),
                    self.config.max_batch_size
                ),
            });
        }

        let received_at = Utc::now();
        let mut accepted = Vec::with_capacity(request.events.len());
        let mut rejected_event_ids = Vec::new();

        for wire in request.events {
            let record = wire.into_record(request.user_id, request.device_id, received_at);
            match validate_record(&record) {
                Ok(()) => accepted.push(record),
                Err(error) => {
                    tracing::warn!(
                        event_id = %record.event_id,
                        event_type = %record.event_type,
                        "rejected event: {}",
                        error
                    );
                    rejected_event_ids.push(record.event_id);
                }
            }
        }

        if !accepted.is_empty() {
            // Conflicts inside count as accepted: the event is in the log.
            self.log.append_batch(&accepted).await?;
        }

        let last_acked_sequence = accepted
            .iter()
            .filter(|record| record.device_id == request.device_id)
            .map(|record| record.sequence_number)
            .max();

        tracing::info!(
            device_id = %request.device_id,
            accepted = accepted.len(),
            rejected = rejected_event_ids.len(),
            last_acked = ?last_acked_sequence,
            "processed sync batch"
        );

        Ok(SyncResponse {
            ack_cursor: AckCursor {
                device_id: request.device_id,
                last_acked_sequence,
            },
            accepted_count: accepted.len(),
            rejected_count: rejected_event_ids.len(),
            rejected_event_ids,
        })
    }
}
