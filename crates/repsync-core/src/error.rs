//! Error taxonomy shared by the client and server halves of the sync engine.
//!
//! The variants map one-to-one onto the failure kinds the engine distinguishes:
//! storage faults propagate to the caller, transport failures are absorbed into
//! queue state, validation failures are surfaced per event, and the
//! single-flight guard reports a concurrent attempt without side effects.

use uuid::Uuid;

/// Result type for sync engine operations
pub type SyncResult<T> = Result<T, SyncError>;

/// Error kinds for sync engine operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum SyncError {
    #[error("storage fault: {message}")]
    StorageFault { message: String },

    #[error("validation rejected: {message}")]
    ValidationRejected { message: String },

    #[error("unknown event type: {event_type}")]
    EventTypeUnknown { event_type: String },

    #[error("network unavailable: {message}")]
    NetworkUnavailable { message: String },

    #[error("request deadline exceeded after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("sync already in progress")]
    SyncInProgress,

    #[error("retry budget exhausted for event {event_id}")]
    RetryBudgetExhausted { event_id: Uuid },

    #[error("merge conflict: {message}")]
    MergeConflict { message: String },

    #[error("serialization error: {message}")]
    Serialization { message: String },
}

impl SyncError {
    /// Shorthand for a storage fault wrapping an underlying store error.
    pub fn storage(source: impl std::fmt::Display) -> Self {
        SyncError::StorageFault {
            message: source.to_string(),
        }
    }

    /// True when the failure is a transport-level one that the queue absorbs
    /// by returning events to `pending` with an incremented retry count.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            SyncError::NetworkUnavailable { .. } | SyncError::Timeout { .. }
        )
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(error: serde_json::Error) -> Self {
        SyncError::Serialization {
            message: error.to_string(),
        }
    }
}
