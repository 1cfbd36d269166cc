//! # Repsync API
//!
//! Server half of the repsync engine:
//! - [`store`]: the append-only event log (PostgreSQL and in-memory)
//! - [`service`]: batch ingestion with per-event validation and idempotent
//!   persistence
//! - [`projections`]: deterministic read-model rebuilds with atomic swap
//! - [`merge`]: anonymous-to-authenticated identity folding
//! - [`api`]: the actix-web HTTP surface
//!
//! The log is the source of truth; projections are derived views that can be
//! rebuilt at any time. The uniqueness constraint on `event_id` carries the
//! whole idempotency contract - at-least-once delivery from clients becomes
//! exactly-once effect in the log.

pub mod api;
pub mod db;
pub mod merge;
pub mod projections;
pub mod service;
pub mod store;

pub use api::{AppState, HeaderIdentityProvider, IdentityProvider};
pub use merge::MergeService;
pub use projections::{
    InMemoryProjectionStore, PostgresProjectionStore, ProjectionRebuilder, ProjectionStore,
    RebuildSummary, SetRow, WorkoutRow, WorkoutStatus,
};
pub use service::{SyncService, SyncServiceConfig};
pub use store::{EventLog, InMemoryEventLog, LogStats, PostgresEventLog};
