//! # Repsync Client
//!
//! Client half of the repsync engine:
//! - [`queue`]: durable local staging with per-row status and retry accounting
//! - [`sequence`]: per-device monotonic sequence generation
//! - [`coordinator`]: single-flight sync driver
//! - [`transport`]: HTTP transport behind a mockable trait
//! - [`auth`]: pull-based auth-state subscription
//! - [`merge`]: client steps of the account merge
//!
//! The durable queue is the client's source of truth. Everything a user does
//! lands there first; the coordinator drains it opportunistically and the
//! server's idempotency contract makes resubmission after any ambiguity safe.

pub mod auth;
pub mod coordinator;
pub mod merge;
pub mod queue;
pub mod sequence;
pub mod transport;

pub use auth::{AuthState, AuthStateChannel};
pub use coordinator::{SyncCoordinator, SyncOutcome};
pub use merge::{AccountMerge, MergeOutcome};
pub use queue::{
    EventQueue, InMemoryEventQueue, QueueStats, QueueStatus, QueuedEvent, SqliteEventQueue,
    SqliteQueueConfig, MAX_RETRY_COUNT,
};
pub use sequence::SequenceGenerator;
pub use transport::{HttpSyncTransport, SyncTransport, TransportConfig};
