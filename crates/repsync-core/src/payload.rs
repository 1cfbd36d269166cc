//! Typed event payloads for the workout domain.
//!
//! The log itself stores payloads as raw JSON so that newer event types remain
//! storable by older servers; this module is the single place where that JSON
//! is checked against the schema for its `event_type`. The ingestion boundary
//! rejects what fails here, the projector skips it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{SyncError, SyncResult};
use crate::event::EventType;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkoutStartedPayload {
    pub workout_id: Uuid,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkoutEndedPayload {
    pub workout_id: Uuid,
    pub ended_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkoutCancelledPayload {
    pub workout_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExerciseAddedPayload {
    pub workout_id: Uuid,
    pub exercise_id: Uuid,
    pub exercise_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetCompletedPayload {
    pub workout_id: Uuid,
    pub exercise_id: Uuid,
    pub set_id: Uuid,
    pub reps: i32,
    pub weight: f64,
    pub completed_at: DateTime<Utc>,
}

/// Partial update; `set_id` plus any subset of the mutable fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetUpdatedPayload {
    pub set_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reps: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetDeletedPayload {
    pub set_id: Uuid,
}

/// Tagged payload variant for the seven event types the projector understands.
///
/// Matching on this enum is what makes the reducer exhaustive at compile time;
/// [`EventPayload::from_parts`] is the run-time schema check at the boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EventPayload {
    WorkoutStarted(WorkoutStartedPayload),
    WorkoutEnded(WorkoutEndedPayload),
    WorkoutCancelled(WorkoutCancelledPayload),
    ExerciseAdded(ExerciseAddedPayload),
    SetCompleted(SetCompletedPayload),
    SetUpdated(SetUpdatedPayload),
    SetDeleted(SetDeletedPayload),
}

impl EventPayload {
    /// The event type tag this payload belongs to.
    pub fn event_type(&self) -> EventType {
        match self {
            EventPayload::WorkoutStarted(_) => EventType::WorkoutStarted,
            EventPayload::WorkoutEnded(_) => EventType::WorkoutEnded,
            EventPayload::WorkoutCancelled(_) => EventType::WorkoutCancelled,
            EventPayload::ExerciseAdded(_) => EventType::ExerciseAdded,
            EventPayload::SetCompleted(_) => EventType::SetCompleted,
            EventPayload::SetUpdated(_) => EventType::SetUpdated,
            EventPayload::SetDeleted(_) => EventType::SetDeleted,
        }
    }

    /// Parse and validate a raw `(event_type, payload)` pair.
    ///
    /// Returns [`SyncError::EventTypeUnknown`] for tags outside the known set
    /// and [`SyncError::ValidationRejected`] when the document does not match
    /// the schema for its tag. Extra fields are tolerated.
    pub fn from_parts(event_type: &str, payload: &Value) -> SyncResult<EventPayload> {
        let tag = EventType::parse(event_type).ok_or_else(|| SyncError::EventTypeUnknown {
            event_type: event_type.to_string(),
        })?;

        let reject = |e: serde_json::Error| SyncError::ValidationRejected {
            message: format!("invalid {} payload: {}", event_type, e),
        };

        let parsed = match tag {
            EventType::WorkoutStarted => {
                EventPayload::WorkoutStarted(serde_json::from_value(payload.clone()).map_err(reject)?)
            }
            EventType::WorkoutEnded => {
                EventPayload::WorkoutEnded(serde_json::from_value(payload.clone()).map_err(reject)?)
            }
            EventType::WorkoutCancelled => EventPayload::WorkoutCancelled(
                serde_json::from_value(payload.clone()).map_err(reject)?,
            ),
            EventType::ExerciseAdded => {
                EventPayload::ExerciseAdded(serde_json::from_value(payload.clone()).map_err(reject)?)
            }
            EventType::SetCompleted => {
                EventPayload::SetCompleted(serde_json::from_value(payload.clone()).map_err(reject)?)
            }
            EventType::SetUpdated => {
                EventPayload::SetUpdated(serde_json::from_value(payload.clone()).map_err(reject)?)
            }
            EventType::SetDeleted => {
                EventPayload::SetDeleted(serde_json::from_value(payload.clone()).map_err(reject)?)
            }
        };

        parsed.check_ranges()?;
        Ok(parsed)
    }

    /// Serialize the payload back to its raw JSON document.
    pub fn to_value(&self) -> SyncResult<Value> {
        let value = match self {
            EventPayload::WorkoutStarted(p) => serde_json::to_value(p)?,
            EventPayload::WorkoutEnded(p) => serde_json::to_value(p)?,
            EventPayload::WorkoutCancelled(p) => serde_json::to_value(p)?,
            EventPayload::ExerciseAdded(p) => serde_json::to_value(p)?,
            EventPayload::SetCompleted(p) => serde_json::to_value(p)?,
            EventPayload::SetUpdated(p) => serde_json::to_value(p)?,
            EventPayload::SetDeleted(p) => serde_json::to_value(p)?,
        };
        Ok(value)
    }

    /// Range checks serde cannot express: reps and weight are non-negative.
    fn check_ranges(&self) -> SyncResult<()> {
        match self {
            EventPayload::SetCompleted(p) => {
                if p.reps < 0 {
                    return Err(SyncError::ValidationRejected {
                        message: format!("reps must be >= 0, got {}", p.reps),
                    });
                }
                if p.weight < 0.0 {
                    return Err(SyncError::ValidationRejected {
                        message: format!("weight must be >= 0, got {}", p.weight),
                    });
                }
            }
            EventPayload::SetUpdated(p) => {
                if let Some(reps) = p.reps {
                    if reps < 0 {
                        return Err(SyncError::ValidationRejected {
                            message: format!("reps must be >= 0, got {}", reps),
                        });
                    }
                }
                if let Some(weight) = p.weight {
                    if weight < 0.0 {
                        return Err(SyncError::ValidationRejected {
                            message: format!("weight must be >= 0, got {}", weight),
                        });
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }
}
