//! HTTP API for the sync engine.
//!
//! Mount with [`init_routes`]:
//!
//! ```rust,no_run
//! use actix_web::{web, App, HttpServer};
//! use repsync_api::api::{init_routes, AppState};
//!
//! async fn start(state: AppState) -> std::io::Result<()> {
//!     let state = web::Data::new(state);
//!     HttpServer::new(move || {
//!         App::new()
//!             .app_data(state.clone())
//!             .configure(init_routes)
//!     })
//!     .bind("127.0.0.1:8080")?
//!     .run()
//!     .await
//! }
//! ```

pub mod health;
pub mod identity;
pub mod projections;
pub mod sync;
pub mod users;

use std::sync::Arc;

use actix_web::{web, HttpResponse};

use repsync_core::SyncError;

use crate::merge::MergeService;
use crate::projections::{ProjectionRebuilder, ProjectionStore};
use crate::service::SyncService;
use crate::store::EventLog;

pub use identity::{HeaderIdentityProvider, IdentityProvider};

/// Shared handler state: the services plus the stores behind them.
#[derive(Clone)]
pub struct AppState {
    pub sync: Arc<SyncService>,
    pub rebuilder: Arc<ProjectionRebuilder>,
    pub merge: Arc<MergeService>,
    pub log: Arc<dyn EventLog>,
    pub projections: Arc<dyn ProjectionStore>,
    pub identity: Arc<dyn IdentityProvider>,
    /// Batches at least this large trigger a background rebuild after ingest.
    pub rebuild_after_events: usize,
}

impl AppState {
    /// Wire the services over a pair of stores with default settings.
    pub fn new(log: Arc<dyn EventLog>, projections: Arc<dyn ProjectionStore>) -> Self {
        let rebuilder = Arc::new(ProjectionRebuilder::new(log.clone(), projections.clone()));
        Self {
            sync: Arc::new(SyncService::new(
                log.clone(),
                crate::service::SyncServiceConfig::default(),
            )),
            merge: Arc::new(MergeService::new(log.clone(), rebuilder.clone())),
            rebuilder,
            log,
            projections,
            identity: Arc::new(HeaderIdentityProvider),
            rebuild_after_events: 50,
        }
    }
}

pub fn init_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .service(sync::sync)
            .service(sync::sync_stats)
            .service(projections::rebuild)
            .service(projections::list_workouts)
            .service(projections::list_sets)
            .service(users::merge)
            .service(health::health),
    );
}

/// Map an engine error onto the HTTP surface.
pub(crate) fn error_response(error: &SyncError) -> HttpResponse {
    let body = serde_json::json!({
        "error": error_kind(error),
        "message": error.to_string(),
    });
    match error {
        SyncError::ValidationRejected { .. } | SyncError::EventTypeUnknown { .. } => {
            HttpResponse::BadRequest().json(body)
        }
        SyncError::MergeConflict { .. } => HttpResponse::Conflict().json(body),
        SyncError::Timeout { .. } => HttpResponse::GatewayTimeout().json(body),
        SyncError::NetworkUnavailable { .. } => HttpResponse::BadGateway().json(body),
        SyncError::StorageFault { .. }
        | SyncError::Serialization { .. }
        | SyncError::SyncInProgress
        | SyncError::RetryBudgetExhausted { .. } => HttpResponse::InternalServerError().json(body),
    }
}

fn error_kind(error: &SyncError) -> &'static str {
    match error {
        SyncError::StorageFault { .. } => "storage_fault",
        SyncError::ValidationRejected { .. } => "validation_rejected",
        SyncError::EventTypeUnknown { .. } => "event_type_unknown",
        SyncError::NetworkUnavailable { .. } => "network_unavailable",
        SyncError::Timeout { .. } => "timeout",
        SyncError::SyncInProgress => "sync_in_progress",
        SyncError::RetryBudgetExhausted { .. } => "retry_budget_exhausted",
        SyncError::MergeConflict { .. } => "merge_conflict",
        SyncError::Serialization { .. } => "serialization",
    }
}
