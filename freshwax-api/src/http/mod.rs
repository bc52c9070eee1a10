//! HTTP surface: thin handlers over the core services.

pub mod allowances;
pub mod cleanup;
pub mod error;
pub mod middleware;
pub mod playlist;
pub mod react;
pub mod slots;
pub mod status;
pub mod validate;
pub mod webhook;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use freshwax_core::bootstrap::Services;
use freshwax_core::store::DocumentStore;
use freshwax_core::Config;

pub use error::{AppError, AppResult};

#[derive(Clone)]
pub struct AppState {
    pub services: Services,
    pub store: Arc<dyn DocumentStore>,
    pub config: Arc<Config>,
}

async fn healthz() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

/// Build the full application router.
pub fn router(state: AppState) -> Router {
    let cors = if state.config.server.cors_allowed_origins.is_empty() {
        CorsLayer::permissive()
    } else {
        let origins: Vec<axum::http::HeaderValue> = state
            .config
            .server
            .cors_allowed_origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(tower_http::cors::AllowOrigin::list(origins))
            .allow_methods(tower_http::cors::Any)
            .allow_headers(tower_http::cors::Any)
    };

    Router::new()
        .route("/healthz", get(healthz))
        .route(
            "/api/livestream/slots",
            get(slots::get_slots)
                .post(slots::post_slots)
                .delete(slots::delete_slot),
        )
        .route("/api/livestream/status", get(status::get_status))
        .route(
            "/api/livestream/validate-stream",
            get(validate::validate_get).post(validate::validate_post),
        )
        .route("/api/livestream/red5-webhook", post(webhook::red5_webhook))
        .route(
            "/api/livestream/react",
            get(react::get_react_state).post(react::post_react),
        )
        .route(
            "/api/livestream/allowances",
            get(allowances::get_allowances)
                .post(allowances::set_allowance)
                .delete(allowances::delete_allowance),
        )
        .route(
            "/api/livestream/chat-cleanup",
            get(cleanup::get_cleanup).post(cleanup::post_cleanup),
        )
        .route(
            "/api/playlist",
            get(playlist::get_playlist).post(playlist::post_playlist),
        )
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(std::time::Duration::from_secs(30)))
        .layer(RequestBodyLimitLayer::new(
            state.config.server.max_body_bytes,
        ))
        .layer(cors)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use freshwax_core::clock::SystemClock;
    use freshwax_core::pubsub::LocalBus;
    use freshwax_core::service::RateLimiter;
    use freshwax_core::store::MemoryStore;

    use super::*;

    fn test_state() -> AppState {
        let mut config = Config::default();
        config.auth.jwt_secret = "test-jwt-secret".to_string();
        config.ingest.signing_secret = "test-signing-secret".to_string();
        config.ingest.webhook_secret = "test-webhook-secret".to_string();

        let store: Arc<MemoryStore> = Arc::new(MemoryStore::new());
        let services = freshwax_core::bootstrap::Services::build(
            &config,
            store.clone(),
            Arc::new(LocalBus::default()),
            Arc::new(SystemClock),
            RateLimiter::in_memory(),
        )
        .expect("services");

        AppState {
            services,
            store,
            config: Arc::new(config),
        }
    }

    #[tokio::test]
    async fn healthz_responds() {
        let app = router(test_state());
        let response = app
            .oneshot(Request::get("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn slot_actions_require_a_bearer_token() {
        let app = router(test_state());
        let response = app
            .oneshot(
                Request::post("/api/livestream/slots")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"action":"generate_key"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn status_is_public_and_cached() {
        let app = router(test_state());
        let response = app
            .oneshot(
                Request::get("/api/livestream/status")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[axum::http::header::CACHE_CONTROL],
            "public, max-age=30"
        );
    }

    #[tokio::test]
    async fn validate_stream_denies_unknown_keys() {
        let app = router(test_state());
        let response = app
            .oneshot(
                Request::get("/api/livestream/validate-stream?key=fwx_a_b_1z_abcdefabcdef")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn webhook_always_returns_200() {
        let app = router(test_state());
        let response = app
            .oneshot(
                Request::post("/api/livestream/red5-webhook")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"event":"publish","streamKey":"nope"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        // Missing signature: still 200, nothing processed.
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn admin_routes_reject_non_admins() {
        let state = test_state();
        let secret = state.config.auth.jwt_secret.clone();
        let app = router(state);

        let exp = chrono::Utc::now().timestamp() + 3600;
        let token =
            super::middleware::issue_token(&secret, "u1", "Lena", false, exp).unwrap();
        let response = app
            .oneshot(
                Request::get("/api/livestream/allowances")
                    .header("authorization", format!("Bearer {token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
