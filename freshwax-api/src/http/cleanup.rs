// Admin endpoints for scheduled chat cleanup.

use axum::extract::{Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};

use freshwax_core::models::SlotId;

use super::middleware::AdminUser;
use super::{AppError, AppResult, AppState};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupRequest {
    pub stream_id: String,
    pub action: String,
    pub cleanup_at: Option<DateTime<Utc>>,
}

/// `POST /api/livestream/chat-cleanup`
pub async fn post_cleanup(
    _admin: AdminUser,
    State(state): State<AppState>,
    Json(request): Json<CleanupRequest>,
) -> AppResult<Json<Value>> {
    let stream_id = SlotId::from(request.stream_id.as_str());
    let cleanup = &state.services.cleanup;

    match request.action.as_str() {
        "schedule" => {
            let job = cleanup.schedule(&stream_id, request.cleanup_at).await?;
            Ok(Json(json!({ "success": true, "job": job })))
        }
        "cancel" => {
            cleanup.cancel(&stream_id).await?;
            Ok(Json(json!({ "success": true })))
        }
        "execute" => {
            let job = cleanup.execute(&stream_id, true).await?;
            Ok(Json(json!({ "success": true, "job": job })))
        }
        other => Err(AppError::bad_request(format!("Unknown action: {other}"))),
    }
}

#[derive(Debug, Deserialize)]
pub struct CleanupListQuery {
    #[serde(default)]
    pub execute: bool,
}

/// `GET /api/livestream/chat-cleanup[?execute=true]` — list pending jobs,
/// or run everything that has come due.
pub async fn get_cleanup(
    _admin: AdminUser,
    State(state): State<AppState>,
    Query(query): Query<CleanupListQuery>,
) -> AppResult<Json<Value>> {
    let cleanup = &state.services.cleanup;
    if query.execute {
        let executed = cleanup.run_due().await?;
        return Ok(Json(json!({ "success": true, "executed": executed })));
    }
    let pending = cleanup.pending().await?;
    Ok(Json(json!({ "success": true, "jobs": pending })))
}
