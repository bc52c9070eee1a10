// Slot scheduling HTTP handlers: schedule queries and the slot action
// dispatch.

use axum::extract::{Query, State};
use axum::Json;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use serde_json::{json, Value};

use freshwax_core::models::{SlotId, UserId};
use freshwax_core::service::scheduler::{BookRequest, GoLiveRequest};
use freshwax_core::service::StreamKeyAccess;

use super::middleware::AuthUser;
use super::{AppError, AppResult, AppState};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotsQuery {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub dj_id: Option<String>,
    pub action: Option<String>,
}

/// `GET /api/livestream/slots`
pub async fn get_slots(
    State(state): State<AppState>,
    Query(query): Query<SlotsQuery>,
) -> AppResult<Json<Value>> {
    let services = &state.services;
    match query.action.as_deref() {
        Some("checkStreamKey") => {
            let dj_id = required_dj(&query)?;
            let countdown = services.session.check_stream_key(&dj_id).await?;
            Ok(Json(json!({ "success": true, "keyStatus": countdown })))
        }
        Some("currentLive") => {
            let live = services.session.current_live().await?;
            Ok(Json(json!({ "success": true, "live": live })))
        }
        Some("canGoLiveAfter") => {
            required_dj(&query)?;
            let available = services.session.can_go_live_after().await?;
            Ok(Json(json!({ "success": true, "canGoLiveAfter": available })))
        }
        Some("history") => {
            let dj_id = query.dj_id.as_deref().map(UserId::from);
            let finished = services.scheduler.history(dj_id.as_ref()).await?;
            let public: Vec<_> = finished.iter().map(|s| s.public()).collect();
            Ok(Json(json!({ "success": true, "slots": public })))
        }
        Some(other) => Err(AppError::bad_request(format!("Unknown action: {other}"))),
        None => {
            let now = chrono::Utc::now();
            let start = query.start.unwrap_or(now - Duration::days(1));
            let end = query.end.unwrap_or(now + Duration::days(31));
            let dj_id = query.dj_id.as_deref().map(UserId::from);
            let view = services
                .scheduler
                .query_schedule(start, end, dj_id.as_ref())
                .await?;
            Ok(Json(json!({ "success": true, "schedule": &*view })))
        }
    }
}

fn required_dj(query: &SlotsQuery) -> AppResult<UserId> {
    query
        .dj_id
        .as_deref()
        .map(UserId::from)
        .ok_or_else(|| AppError::bad_request("djId is required for this action"))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotActionRequest {
    pub action: String,
    pub slot_id: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub duration: Option<i64>,
    pub title: Option<String>,
    pub genre: Option<String>,
    pub description: Option<String>,
    pub relay_url: Option<String>,
    #[serde(default)]
    pub admin_cancel: bool,
}

impl SlotActionRequest {
    fn slot_id(&self) -> AppResult<SlotId> {
        self.slot_id
            .as_deref()
            .map(SlotId::from)
            .ok_or_else(|| AppError::bad_request("slotId is required"))
    }

    fn go_live_request(&self, auth: &AuthUser) -> GoLiveRequest {
        GoLiveRequest {
            dj_id: auth.user_id.clone(),
            duration: self.duration,
            title: self.title.clone().unwrap_or_else(|| "Live session".to_string()),
            genre: self.genre.clone().unwrap_or_default(),
            description: self.description.clone().unwrap_or_default(),
        }
    }
}

/// `POST /api/livestream/slots`
pub async fn post_slots(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(request): Json<SlotActionRequest>,
) -> AppResult<Json<Value>> {
    let services = &state.services;
    match request.action.as_str() {
        "book" => {
            let start_time = request
                .start_time
                .ok_or_else(|| AppError::bad_request("startTime is required"))?;
            let duration = request
                .duration
                .ok_or_else(|| AppError::bad_request("duration is required"))?;
            let booked = services
                .scheduler
                .book(BookRequest {
                    dj_id: auth.user_id.clone(),
                    start_time,
                    duration,
                    title: request
                        .title
                        .clone()
                        .ok_or_else(|| AppError::bad_request("title is required"))?,
                    genre: request.genre.clone().unwrap_or_default(),
                    description: request.description.clone().unwrap_or_default(),
                })
                .await?;
            Ok(Json(json!({ "success": true, "slot": booked })))
        }
        "go_live_now" | "go_live" => {
            let live = services
                .scheduler
                .go_live_now(request.go_live_request(&auth))
                .await?;
            Ok(Json(json!({ "success": true, "slot": live })))
        }
        "go_live_after" => {
            let queued = services
                .scheduler
                .go_live_after(request.go_live_request(&auth))
                .await?;
            Ok(Json(json!({ "success": true, "slot": queued })))
        }
        "cancel" => {
            let admin = request.admin_cancel && auth.is_admin;
            let slot = services
                .scheduler
                .cancel(&request.slot_id()?, &auth.user_id, admin)
                .await?;
            Ok(Json(json!({ "success": true, "slot": slot.public() })))
        }
        "endStream" => {
            let slot = services
                .scheduler
                .end_stream(&request.slot_id()?, &auth.user_id, auth.is_admin)
                .await?;
            Ok(Json(json!({ "success": true, "slot": slot.public() })))
        }
        "getStreamKey" => {
            let access = services
                .scheduler
                .get_stream_key(&request.slot_id()?, &auth.user_id, auth.is_admin)
                .await?;
            match access {
                StreamKeyAccess::Available {
                    stream_key,
                    rtmp_url,
                    hls_url,
                    expires_at,
                } => Ok(Json(json!({
                    "success": true,
                    "streamKey": stream_key,
                    "rtmpUrl": rtmp_url,
                    "hlsUrl": hls_url,
                    "expiresAt": expires_at,
                }))),
                StreamKeyAccess::NotYetAvailable { key_available_at } => {
                    Err(AppError::forbidden("Stream key is not available yet")
                        .with_extra("keyAvailableAt", json!(key_available_at)))
                }
                StreamKeyAccess::Expired => {
                    Err(AppError::forbidden("Stream key grace period has expired"))
                }
            }
        }
        "generate_key" => {
            let issued = services.scheduler.generate_key(&auth.user_id).await?;
            Ok(Json(json!({ "success": true, "slot": issued })))
        }
        "start_relay" => {
            let relay_url = request
                .relay_url
                .as_deref()
                .ok_or_else(|| AppError::bad_request("relayUrl is required"))?;
            let slot = services
                .scheduler
                .start_relay(
                    &auth.user_id,
                    relay_url,
                    request.title.clone().unwrap_or_else(|| "Relay".to_string()),
                    request.duration,
                )
                .await?;
            Ok(Json(json!({ "success": true, "slot": slot.public() })))
        }
        "early_start" => {
            let slot = services.scheduler.early_start(&auth.user_id).await?;
            Ok(Json(json!({ "success": true, "slot": slot })))
        }
        "mark_ready" => {
            let slot = services
                .session
                .mark_ready(&request.slot_id()?, &auth.user_id)
                .await?;
            Ok(Json(json!({ "success": true, "slot": slot.public() })))
        }
        other => Err(AppError::bad_request(format!("Unknown action: {other}"))),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelRequest {
    pub slot_id: String,
    #[serde(default)]
    pub admin_cancel: bool,
}

/// `DELETE /api/livestream/slots` — equivalent to the `cancel` action.
pub async fn delete_slot(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(request): Json<CancelRequest>,
) -> AppResult<Json<Value>> {
    let admin = request.admin_cancel && auth.is_admin;
    let slot = state
        .services
        .scheduler
        .cancel(&SlotId::from(request.slot_id.as_str()), &auth.user_id, admin)
        .await?;
    Ok(Json(json!({ "success": true, "slot": slot.public() })))
}
