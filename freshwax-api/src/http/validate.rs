// Ingest authentication endpoint. Two wire shapes share the validation
// path: a query-style GET used by some ingest servers and a control-plane
// POST used by others. HTTP 200 admits, any non-200 denies.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use freshwax_core::service::{extract_stream_key, KeyValidation};

use super::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateQuery {
    pub key: Option<String>,
    pub name: Option<String>,
    pub stream_key: Option<String>,
}

/// `GET /api/livestream/validate-stream?key=...`
pub async fn validate_get(
    State(state): State<AppState>,
    Query(query): Query<ValidateQuery>,
) -> Response {
    let Some(candidate) = extract_stream_key(
        query.key.as_deref(),
        query.name.as_deref(),
        query.stream_key.as_deref(),
        None,
    ) else {
        return deny("Missing stream key");
    };
    run_validation(&state, &candidate).await
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateBody {
    /// `read` and `playback` admit unconditionally; `publish` validates.
    pub action: Option<String>,
    pub path: Option<String>,
    pub protocol: Option<String>,
    pub ip: Option<String>,
    pub key: Option<String>,
    pub name: Option<String>,
    pub stream_key: Option<String>,
}

/// `POST /api/livestream/validate-stream`
pub async fn validate_post(
    State(state): State<AppState>,
    Json(body): Json<ValidateBody>,
) -> Response {
    match body.action.as_deref() {
        Some("read" | "playback") => {
            (StatusCode::OK, Json(json!({ "valid": true }))).into_response()
        }
        Some("publish") | None => {
            let Some(candidate) = extract_stream_key(
                body.key.as_deref(),
                body.name.as_deref(),
                body.stream_key.as_deref(),
                body.path.as_deref(),
            ) else {
                return deny("Missing stream key");
            };
            tracing::debug!(
                protocol = body.protocol.as_deref().unwrap_or(""),
                ip = body.ip.as_deref().unwrap_or(""),
                "publish auth request"
            );
            run_validation(&state, &candidate).await
        }
        Some(other) => deny(&format!("Unknown action: {other}")),
    }
}

async fn run_validation(state: &AppState, candidate: &str) -> Response {
    match state.services.credentials.validate(candidate).await {
        Ok(KeyValidation::Valid { slot }) => (
            StatusCode::OK,
            Json(json!({
                "valid": true,
                "slotId": slot.id,
                "djId": slot.dj_id,
                "djName": slot.dj_name,
            })),
        )
            .into_response(),
        Ok(KeyValidation::Rejected(rejection)) => {
            tracing::info!(reason = %rejection.reason(), "publish denied");
            deny(&rejection.reason())
        }
        Err(err) => {
            tracing::error!(error = %err, "stream validation errored");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "valid": false, "reason": "validation unavailable" })),
            )
                .into_response()
        }
    }
}

fn deny(reason: &str) -> Response {
    (
        StatusCode::FORBIDDEN,
        Json(json!({ "valid": false, "reason": reason })),
    )
        .into_response()
}
