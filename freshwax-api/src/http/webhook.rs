// Ingest webhook endpoint. Always answers 200 so the ingest server never
// enters a retry storm; all failures are logged instead.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde_json::{json, Value};

use freshwax_core::service::IngestEvent;

use super::AppState;

const SIGNATURE_HEADERS: [&str; 2] = ["x-red5-signature", "x-webhook-signature"];

/// `POST /api/livestream/red5-webhook`
pub async fn red5_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Json<Value> {
    let signature = SIGNATURE_HEADERS
        .iter()
        .find_map(|name| headers.get(*name))
        .and_then(|value| value.to_str().ok());

    let Some(signature) = signature else {
        tracing::warn!("webhook without signature header");
        return Json(json!({ "success": false }));
    };
    if !state
        .services
        .session
        .verify_webhook_signature(&body, signature)
    {
        tracing::warn!("webhook signature mismatch");
        return Json(json!({ "success": false }));
    }

    let event: IngestEvent = match serde_json::from_slice(&body) {
        Ok(event) => event,
        Err(err) => {
            tracing::warn!(error = %err, "unparseable webhook body");
            return Json(json!({ "success": false }));
        }
    };

    if let Err(err) = state.services.session.apply_webhook(&event).await {
        tracing::error!(error = %err, event = ?event.event, "webhook processing failed");
        return Json(json!({ "success": false }));
    }
    Json(json!({ "success": true }))
}
