//! Projection rebuild trigger and the read API over the projection tables.

use actix_web::{get, post, web, HttpRequest, HttpResponse};
use uuid::Uuid;

use repsync_core::RebuildResponse;

use super::{error_response, AppState};

/// `POST /api/v1/projections/rebuild` - rebuild every projection from the log.
#[post("/projections/rebuild")]
pub async fn rebuild(state: web::Data<AppState>) -> HttpResponse {
    match state.rebuilder.rebuild(None).await {
        Ok(summary) => HttpResponse::Ok().json(RebuildResponse {
            workouts_written: summary.workouts_written,
            sets_written: summary.sets_written,
            duration_ms: summary.duration_ms,
        }),
        Err(error) => {
            tracing::error!("projection rebuild failed: {}", error);
            error_response(&error)
        }
    }
}

/// `GET /api/v1/workouts` - the caller's workouts, from the projection.
#[get("/workouts")]
pub async fn list_workouts(state: web::Data<AppState>, request: HttpRequest) -> HttpResponse {
    let Some(identity) = state.identity.resolve(&request) else {
        return HttpResponse::Unauthorized().json(serde_json::json!({
            "error": "identity_required",
            "message": "no identity header present",
        }));
    };

    match state.projections.workouts_for_user(identity.user_id()).await {
        Ok(workouts) => HttpResponse::Ok().json(workouts),
        Err(error) => error_response(&error),
    }
}

/// `GET /api/v1/workouts/{workout_id}/sets` - sets folded into one workout.
#[get("/workouts/{workout_id}/sets")]
pub async fn list_sets(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> HttpResponse {
    let workout_id = path.into_inner();
    match state.projections.sets_for_workout(workout_id).await {
        Ok(sets) => HttpResponse::Ok().json(sets),
        Err(error) => error_response(&error),
    }
}
