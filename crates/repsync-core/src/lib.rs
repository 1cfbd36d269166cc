//! # Repsync Core
//!
//! Shared primitives for the repsync offline-first sync engine:
//! - The [`EventRecord`] domain event and its typed payloads
//! - Payload schema validation for the ingestion boundary
//! - The wire protocol DTOs exchanged between client and server
//! - The error taxonomy shared by both halves of the engine
//!
//! ## Core Concepts
//!
//! Every workout state change is captured as an immutable [`EventRecord`],
//! identified globally by `event_id` (the idempotency key) and ordered per
//! device by `sequence_number`. The client stages records in a durable queue,
//! the server appends them to an append-only log, and read models are
//! deterministic folds of that log.
//!
//! ## Examples
//!
//! ```rust
//! use repsync_core::{EventPayload, EventRecord, payload::WorkoutStartedPayload};
//! use uuid::Uuid;
//! use chrono::Utc;
//!
//! let payload = EventPayload::WorkoutStarted(WorkoutStartedPayload {
//!     workout_id: Uuid::new_v4(),
//!     started_at: Utc::now(),
//! });
//! let record = EventRecord::from_payload(&payload, Uuid::new_v4(), Uuid::new_v4(), 1).unwrap();
//! assert_eq!(record.event_type, "WorkoutStarted");
//! ```

pub mod error;
pub mod event;
pub mod identity;
pub mod payload;
pub mod protocol;

pub use error::{SyncError, SyncResult};
pub use event::{validate_record, EventRecord, EventType};
pub use identity::Identity;
pub use payload::EventPayload;
pub use protocol::{
    AckCursor, MergeRequest, MergeResponse, RebuildResponse, SyncRequest, SyncResponse, WireEvent,
};

/// Current version of the repsync core crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for common imports
pub mod prelude {
    pub use crate::{
        AckCursor, EventPayload, EventRecord, EventType, Identity, SyncError, SyncRequest,
        SyncResponse, SyncResult, WireEvent,
    };
    pub use chrono::{DateTime, Utc};
    pub use serde_json::{json, Value};
    pub use uuid::Uuid;
}
