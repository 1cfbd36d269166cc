//! The canonical domain event carried through both sides of the engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{SyncError, SyncResult};
use crate::payload::EventPayload;

/// The seven event type tags the projector understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    WorkoutStarted,
    WorkoutEnded,
    WorkoutCancelled,
    ExerciseAdded,
    SetCompleted,
    SetUpdated,
    SetDeleted,
}

impl EventType {
    pub const ALL: [EventType; 7] = [
        EventType::WorkoutStarted,
        EventType::WorkoutEnded,
        EventType::WorkoutCancelled,
        EventType::ExerciseAdded,
        EventType::SetCompleted,
        EventType::SetUpdated,
        EventType::SetDeleted,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::WorkoutStarted => "WorkoutStarted",
            EventType::WorkoutEnded => "WorkoutEnded",
            EventType::WorkoutCancelled => "WorkoutCancelled",
            EventType::ExerciseAdded => "ExerciseAdded",
            EventType::SetCompleted => "SetCompleted",
            EventType::SetUpdated => "SetUpdated",
            EventType::SetDeleted => "SetDeleted",
        }
    }

    /// Parse a wire tag; `None` for anything outside the known set.
    pub fn parse(tag: &str) -> Option<EventType> {
        EventType::ALL.iter().copied().find(|t| t.as_str() == tag)
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An immutable record of a domain state change.
///
/// `event_id` is the global idempotency key; `(device_id, sequence_number)` is
/// the replay order. The `event_type`/`payload` pair stays raw here so the log
/// can hold event types a given build does not yet understand; use
/// [`EventPayload::from_parts`] to get the typed view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub event_id: Uuid,
    pub event_type: String,
    pub payload: Value,
    pub user_id: Uuid,
    pub device_id: Uuid,
    pub sequence_number: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl EventRecord {
    /// Mint a new record from a typed payload, stamping a fresh `event_id`
    /// and the current wall clock. The clock is informational only; ordering
    /// comes exclusively from `sequence_number`.
    pub fn from_payload(
        payload: &EventPayload,
        user_id: Uuid,
        device_id: Uuid,
        sequence_number: i64,
    ) -> SyncResult<EventRecord> {
        Ok(EventRecord {
            event_id: Uuid::new_v4(),
            event_type: payload.event_type().as_str().to_string(),
            payload: payload.to_value()?,
            user_id,
            device_id,
            sequence_number,
            correlation_id: None,
            created_at: Utc::now(),
        })
    }

    pub fn with_correlation_id(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }

    /// The typed view of the payload, validated against its tag.
    pub fn typed_payload(&self) -> SyncResult<EventPayload> {
        EventPayload::from_parts(&self.event_type, &self.payload)
    }
}

/// Validate a record at the ingestion boundary.
///
/// Checks the identifier, the sequence range and the payload schema. Events
/// failing here are rejected individually; the rest of a batch proceeds.
pub fn validate_record(record: &EventRecord) -> SyncResult<()> {
    if record.event_id.is_nil() {
        return Err(SyncError::ValidationRejected {
            message: "event_id must not be the nil identifier".to_string(),
        });
    }
    if record.sequence_number <= 0 {
        return Err(SyncError::ValidationRejected {
            message: format!(
                "sequence_number must be positive, got {}",
                record.sequence_number
            ),
        });
    }
    EventPayload::from_parts(&record.event_type, &record.payload)?;
    Ok(())
}
