// Public live-status feed. SECURITY: responses are built from the public
// slot projection and never carry stream keys.

use axum::extract::{Query, State};
use axum::http::{header, HeaderValue};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Duration;
use serde::Deserialize;
use serde_json::json;

use freshwax_core::models::SlotId;

use super::{AppResult, AppState};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusQuery {
    pub stream_id: Option<String>,
}

/// `GET /api/livestream/status[?streamId=]`
pub async fn get_status(
    State(state): State<AppState>,
    Query(query): Query<StatusQuery>,
) -> AppResult<Response> {
    let services = &state.services;

    if let Some(stream_id) = query.stream_id.as_deref() {
        let slot = services
            .scheduler
            .get_public_slot(&SlotId::from(stream_id))
            .await?;
        let is_live = slot.status == freshwax_core::models::SlotStatus::Live;
        let mut response =
            Json(json!({ "success": true, "stream": slot })).into_response();
        set_cache_control(&mut response, is_live);
        return Ok(response);
    }

    let live = services.session.current_live().await?;
    let is_live = live.is_some();

    let now = chrono::Utc::now();
    let schedule = services
        .scheduler
        .query_schedule(now - Duration::hours(1), now + Duration::days(31), None)
        .await?;

    let body = match &live {
        Some(current) => json!({
            "success": true,
            "isLive": true,
            "streams": [current.slot.clone()],
            "primaryStream": current,
        }),
        None => json!({
            "success": true,
            "isLive": false,
            "streams": [],
            "scheduled": schedule.upcoming,
        }),
    };

    let mut response = Json(body).into_response();
    set_cache_control(&mut response, is_live);
    Ok(response)
}

/// 10 s while live, 30 s offline.
fn set_cache_control(response: &mut Response, is_live: bool) {
    let value = if is_live {
        "public, max-age=10"
    } else {
        "public, max-age=30"
    };
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static(value));
}
