//! Batch ingestion endpoint.

use actix_web::{get, post, web, HttpResponse};

use repsync_core::SyncRequest;

use super::{error_response, AppState};

/// `POST /api/v1/sync` - submit a batch of events.
///
/// Returns the acknowledgment cursor plus per-event acceptance. A batch large
/// enough to matter schedules a background projection rebuild for the
/// submitting user; the sync response never waits on it.
#[post("/sync")]
pub async fn sync(
    state: web::Data<AppState>,
    body: web::Json<SyncRequest>,
) -> HttpResponse {
    let request = body.into_inner();
    let user_id = request.user_id;

    match state.sync.ingest(request).await {
        Ok(response) => {
            if response.accepted_count >= state.rebuild_after_events {
                let rebuilder = state.rebuilder.clone();
                tokio::spawn(async move {
                    if let Err(error) = rebuilder.rebuild(Some(user_id)).await {
                        tracing::error!(%user_id, "background rebuild failed: {}", error);
                    }
                });
            }
            HttpResponse::Ok().json(response)
        }
        Err(error) => {
            tracing::error!("sync batch failed: {}", error);
            error_response(&error)
        }
    }
}

/// `GET /api/v1/sync/stats` - log-level counters.
#[get("/sync/stats")]
pub async fn sync_stats(state: web::Data<AppState>) -> HttpResponse {
    match state.log.stats().await {
        Ok(stats) => HttpResponse::Ok().json(stats),
        Err(error) => error_response(&error),
    }
}
