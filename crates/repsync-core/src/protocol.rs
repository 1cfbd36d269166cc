//! Wire protocol DTOs for the sync, merge and rebuild endpoints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::event::EventRecord;

/// One event as carried in a sync batch.
///
/// Identity attribution lives on the batch envelope, not the event;
/// `created_at` is optional on the wire and defaults to the server clock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireEvent {
    pub event_id: Uuid,
    pub event_type: String,
    pub payload: Value,
    pub sequence_number: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl WireEvent {
    pub fn from_record(record: &EventRecord) -> WireEvent {
        WireEvent {
            event_id: record.event_id,
            event_type: record.event_type.clone(),
            payload: record.payload.clone(),
            sequence_number: record.sequence_number,
            correlation_id: record.correlation_id,
            created_at: Some(record.created_at),
        }
    }

    /// Attribute the event to the batch identity, filling `created_at` from
    /// `received_at` when the client did not send one.
    pub fn into_record(
        self,
        user_id: Uuid,
        device_id: Uuid,
        received_at: DateTime<Utc>,
    ) -> EventRecord {
        EventRecord {
            event_id: self.event_id,
            event_type: self.event_type,
            payload: self.payload,
            user_id,
            device_id,
            sequence_number: self.sequence_number,
            correlation_id: self.correlation_id,
            created_at: self.created_at.unwrap_or(received_at),
        }
    }
}

/// Batch submission body for `POST /api/v1/sync`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncRequest {
    pub device_id: Uuid,
    pub user_id: Uuid,
    pub events: Vec<WireEvent>,
}

/// Proof of progress: the highest acknowledged sequence for a device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AckCursor {
    pub device_id: Uuid,
    pub last_acked_sequence: Option<i64>,
}

/// Per-batch acknowledgment returned by the sync endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncResponse {
    pub ack_cursor: AckCursor,
    pub accepted_count: usize,
    pub rejected_count: usize,
    pub rejected_event_ids: Vec<Uuid>,
}

/// Body for `POST /api/v1/users/merge`, submitted under the authenticated
/// identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeRequest {
    pub anonymous_user_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeResponse {
    pub merged_event_count: usize,
}

/// Response for `POST /api/v1/projections/rebuild`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RebuildResponse {
    pub workouts_written: usize,
    pub sets_written: usize,
    pub duration_ms: u64,
}
