//! Health endpoint.

use actix_web::{get, web, HttpResponse};
use serde::Serialize;

use crate::store::LogStats;

use super::AppState;

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: String,
    pub version: String,
    pub timestamp: i64,
    pub log: Option<LogStats>,
}

/// `GET /api/v1/health` - liveness plus a cheap look at the log.
#[get("/health")]
pub async fn health(state: web::Data<AppState>) -> HttpResponse {
    let log = state.log.stats().await.ok();
    let status = if log.is_some() { "healthy" } else { "degraded" };

    HttpResponse::Ok().json(HealthStatus {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: chrono::Utc::now().timestamp(),
        log,
    })
}
