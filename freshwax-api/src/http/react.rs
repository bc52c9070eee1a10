// Reactions and presence HTTP handlers.

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use freshwax_core::models::{SessionId, SlotId, UserId};
use freshwax_core::service::{PRESENCE_RULE, REACTION_RULE};

use super::middleware::MaybeAuthUser;
use super::{AppError, AppResult, AppState};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactRequest {
    pub action: String,
    pub stream_id: String,
    pub session_id: Option<String>,
    pub user_id: Option<String>,
    pub user_name: Option<String>,
    pub emoji: Option<String>,
    pub rating: Option<u8>,
    pub count: Option<u32>,
    pub name: Option<String>,
    pub message: Option<String>,
}

impl ReactRequest {
    fn session_id(&self) -> AppResult<SessionId> {
        self.session_id
            .as_deref()
            .map(SessionId::from)
            .ok_or_else(|| AppError::bad_request("sessionId is required"))
    }

    /// Identity used for rate limiting: user, then session, then nothing
    /// better than the shared anonymous bucket.
    fn client_key(&self, auth: &Option<super::middleware::AuthUser>) -> String {
        auth.as_ref()
            .map(|u| u.user_id.as_str().to_string())
            .or_else(|| self.user_id.clone())
            .or_else(|| self.session_id.clone())
            .unwrap_or_else(|| "anonymous".to_string())
    }

    fn display_name(&self, auth: &Option<super::middleware::AuthUser>) -> String {
        auth.as_ref()
            .map(|u| u.name.clone())
            .filter(|n| !n.is_empty())
            .or_else(|| self.user_name.clone())
            .unwrap_or_else(|| "Guest".to_string())
    }

    fn user_id(&self, auth: &Option<super::middleware::AuthUser>) -> AppResult<UserId> {
        auth.as_ref()
            .map(|u| u.user_id.clone())
            .or_else(|| self.user_id.as_deref().map(UserId::from))
            .ok_or_else(|| AppError::unauthorized("Sign in to do that"))
    }
}

/// `POST /api/livestream/react`
pub async fn post_react(
    MaybeAuthUser(auth): MaybeAuthUser,
    State(state): State<AppState>,
    Json(request): Json<ReactRequest>,
) -> AppResult<Json<Value>> {
    let services = &state.services;
    let stream_id = SlotId::from(request.stream_id.as_str());
    let client = request.client_key(&auth);

    match request.action.as_str() {
        "join" => {
            services
                .rate_limiter
                .check("presence", &client, PRESENCE_RULE)
                .await?;
            let user = auth.as_ref().map(|u| u.user_id.clone());
            let counters = services
                .reactions
                .join(&stream_id, user.as_ref(), &request.session_id()?)
                .await?;
            Ok(Json(json!({ "success": true, "counters": counters })))
        }
        "leave" => {
            let counters = services
                .reactions
                .leave(&stream_id, &request.session_id()?)
                .await?;
            Ok(Json(json!({ "success": true, "counters": counters })))
        }
        "heartbeat" => {
            services
                .rate_limiter
                .check("presence", &client, PRESENCE_RULE)
                .await?;
            let counters = services
                .reactions
                .heartbeat(&stream_id, &request.session_id()?)
                .await?;
            Ok(Json(json!({ "success": true, "counters": counters })))
        }
        "like" => {
            let user = request.user_id(&auth)?;
            let total = services.reactions.like(&stream_id, &user).await?;
            Ok(Json(json!({ "success": true, "totalLikes": total })))
        }
        "rate" => {
            let user = request.user_id(&auth)?;
            let rating = request
                .rating
                .ok_or_else(|| AppError::bad_request("rating is required"))?;
            let average = services.reactions.rate(&stream_id, &user, rating).await?;
            Ok(Json(json!({ "success": true, "averageRating": average })))
        }
        "emoji" => {
            services
                .rate_limiter
                .check("react", &client, REACTION_RULE)
                .await?;
            let user = request.user_id(&auth)?;
            let emoji = request
                .emoji
                .as_deref()
                .ok_or_else(|| AppError::bad_request("emoji is required"))?;
            let session = request.session_id.as_deref().map(SessionId::from);
            services
                .reactions
                .emoji(
                    &stream_id,
                    &user,
                    &request.display_name(&auth),
                    emoji,
                    session.as_ref(),
                )
                .await?;
            Ok(Json(json!({ "success": true })))
        }
        "star" => {
            services
                .rate_limiter
                .check("react", &client, REACTION_RULE)
                .await?;
            let user = request.user_id(&auth)?;
            services
                .reactions
                .star(
                    &stream_id,
                    &user,
                    &request.display_name(&auth),
                    request.count.unwrap_or(1),
                )
                .await?;
            Ok(Json(json!({ "success": true })))
        }
        "shoutout" => {
            services
                .rate_limiter
                .check("react", &client, REACTION_RULE)
                .await?;
            let name = request
                .name
                .clone()
                .unwrap_or_else(|| request.display_name(&auth));
            let message = request
                .message
                .as_deref()
                .ok_or_else(|| AppError::bad_request("message is required"))?;
            services
                .reactions
                .shoutout(&stream_id, &name, message)
                .await?;
            Ok(Json(json!({ "success": true })))
        }
        other => Err(AppError::bad_request(format!("Unknown action: {other}"))),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactStateQuery {
    pub stream_id: String,
    pub user_id: String,
}

/// `GET /api/livestream/react?streamId&userId` — the caller's prior
/// like/rating state.
pub async fn get_react_state(
    State(state): State<AppState>,
    Query(query): Query<ReactStateQuery>,
) -> AppResult<Json<Value>> {
    let reaction_state = state
        .services
        .reactions
        .viewer_state(
            &SlotId::from(query.stream_id.as_str()),
            &UserId::from(query.user_id.as_str()),
        )
        .await?;
    Ok(Json(json!({ "success": true, "state": reaction_state })))
}
