// Admin CRUD for per-DJ allowance overrides.

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use freshwax_core::models::{DjAllowance, UserId};
use freshwax_core::repo::ArtistRepository;

use super::middleware::AdminUser;
use super::{AppError, AppResult, AppState};

fn artists(state: &AppState) -> ArtistRepository {
    ArtistRepository::new(state.store.clone())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllowanceQuery {
    pub dj_id: Option<String>,
}

/// `GET /api/livestream/allowances[?djId=]`
pub async fn get_allowances(
    _admin: AdminUser,
    State(state): State<AppState>,
    Query(query): Query<AllowanceQuery>,
) -> AppResult<Json<Value>> {
    let repo = artists(&state);
    match query.dj_id.as_deref() {
        Some(dj_id) => {
            let allowance = repo.allowance(&UserId::from(dj_id)).await?;
            Ok(Json(json!({ "success": true, "allowance": allowance })))
        }
        None => {
            let all: Vec<Value> = repo
                .list_allowances()
                .await?
                .into_iter()
                .map(|(dj_id, allowance)| json!({ "djId": dj_id, "allowance": allowance }))
                .collect();
            Ok(Json(json!({ "success": true, "allowances": all })))
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetAllowanceRequest {
    pub dj_id: String,
    pub weekly_slots: u32,
    pub max_hours_per_day: u32,
    pub reason: Option<String>,
}

/// `POST /api/livestream/allowances`
pub async fn set_allowance(
    _admin: AdminUser,
    State(state): State<AppState>,
    Json(request): Json<SetAllowanceRequest>,
) -> AppResult<Json<Value>> {
    let allowance = DjAllowance {
        weekly_slots: request.weekly_slots,
        max_hours_per_day: request.max_hours_per_day,
        reason: request.reason,
    };
    if !allowance.is_valid() {
        return Err(AppError::bad_request(
            "weeklySlots must be 1-14 and maxHoursPerDay 1-12",
        ));
    }
    artists(&state)
        .set_allowance(&UserId::from(request.dj_id.as_str()), &allowance)
        .await?;
    Ok(Json(json!({ "success": true, "allowance": allowance })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteAllowanceRequest {
    pub dj_id: String,
}

/// `DELETE /api/livestream/allowances`
pub async fn delete_allowance(
    _admin: AdminUser,
    State(state): State<AppState>,
    Json(request): Json<DeleteAllowanceRequest>,
) -> AppResult<Json<Value>> {
    artists(&state)
        .delete_allowance(&UserId::from(request.dj_id.as_str()))
        .await?;
    Ok(Json(json!({ "success": true })))
}
