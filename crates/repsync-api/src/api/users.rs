//! Account merge endpoint.

use actix_web::{post, web, HttpRequest, HttpResponse};

use repsync_core::{MergeRequest, MergeResponse};

use super::{error_response, AppState};

/// `POST /api/v1/users/merge` - fold the anonymous identity named in the body
/// into the authenticated identity making the request.
#[post("/users/merge")]
pub async fn merge(
    state: web::Data<AppState>,
    request: HttpRequest,
    body: web::Json<MergeRequest>,
) -> HttpResponse {
    let identity = match state.identity.resolve(&request) {
        Some(identity) if identity.is_authenticated() => identity,
        _ => {
            return HttpResponse::Unauthorized().json(serde_json::json!({
                "error": "identity_required",
                "message": "merge requires an authenticated identity",
            }));
        }
    };

    match state
        .merge
        .merge(body.anonymous_user_id, identity.user_id())
        .await
    {
        Ok(merged_event_count) => HttpResponse::Ok().json(MergeResponse { merged_event_count }),
        Err(error) => {
            tracing::error!("merge failed: {}", error);
            error_response(&error)
        }
    }
}
