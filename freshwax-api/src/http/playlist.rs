// Global playlist HTTP handlers. All mutations go through the
// coordinator; handlers never touch the playlist document directly.

use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use freshwax_core::models::{PlayHistoryEntry, Platform};

use super::middleware::AuthUser;
use super::{AppError, AppResult, AppState};

/// `GET /api/playlist` — the authoritative document plus the derived
/// playhead for late joiners.
pub async fn get_playlist(State(state): State<AppState>) -> AppResult<Json<Value>> {
    let coordinator = &state.services.playlist;
    let playlist = coordinator.load().await?;
    let playhead_ms = coordinator.playhead_ms(&playlist);
    Ok(Json(json!({
        "success": true,
        "playlist": playlist,
        "playheadMs": playhead_ms,
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistRequest {
    pub action: String,
    pub url: Option<String>,
    pub item_id: Option<String>,
    pub title: Option<String>,
    pub thumbnail: Option<String>,
}

/// `POST /api/playlist`
pub async fn post_playlist(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(request): Json<PlaylistRequest>,
) -> AppResult<Json<Value>> {
    let coordinator = &state.services.playlist;

    match request.action.as_str() {
        "add" => {
            let url = request
                .url
                .as_deref()
                .ok_or_else(|| AppError::bad_request("url is required"))?;
            let playlist = coordinator.add(&auth.user_id, &auth.name, url).await?;
            Ok(Json(json!({ "success": true, "playlist": playlist })))
        }
        "remove" => {
            let item_id = request
                .item_id
                .as_deref()
                .ok_or_else(|| AppError::bad_request("itemId is required"))?;
            let playlist = coordinator
                .remove(item_id, &auth.user_id, auth.is_admin)
                .await?;
            Ok(Json(json!({ "success": true, "playlist": playlist })))
        }
        // Skip is admin- or system-triggered; the track still counts as
        // played for cooldown purposes.
        "next" | "skip" => {
            if !auth.is_admin {
                return Err(AppError::forbidden("Only admins can skip"));
            }
            let playlist = coordinator.advance(true).await?;
            Ok(Json(json!({ "success": true, "playlist": playlist })))
        }
        "track_ended" => {
            let playlist = coordinator.advance(true).await?;
            Ok(Json(json!({ "success": true, "playlist": playlist })))
        }
        "save_personal" => {
            let url = request
                .url
                .as_deref()
                .ok_or_else(|| AppError::bad_request("url is required"))?;
            let parsed: url::Url = url
                .parse()
                .map_err(|_| AppError::bad_request("Invalid track URL"))?;
            let platform = Platform::classify(&parsed);
            let entry = PlayHistoryEntry {
                url: url.to_string(),
                platform,
                embed_id: platform.embed_id(&parsed),
                title: request.title.clone(),
                thumbnail: request.thumbnail.clone(),
                played_at: chrono::Utc::now(),
            };
            let tracks = coordinator
                .save_personal_track(&auth.user_id, entry)
                .await?;
            Ok(Json(json!({ "success": true, "tracks": tracks })))
        }
        "remove_personal" => {
            let url = request
                .url
                .as_deref()
                .ok_or_else(|| AppError::bad_request("url is required"))?;
            let tracks = coordinator
                .remove_personal_track(&auth.user_id, url)
                .await?;
            Ok(Json(json!({ "success": true, "tracks": tracks })))
        }
        "list_personal" => {
            let tracks = coordinator.personal_playlist(&auth.user_id).await?;
            Ok(Json(json!({ "success": true, "tracks": tracks })))
        }
        other => Err(AppError::bad_request(format!("Unknown action: {other}"))),
    }
}
