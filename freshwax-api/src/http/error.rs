// HTTP error handling

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Map, Value};
use std::fmt;

/// Result type for HTTP handlers
pub type AppResult<T> = Result<T, AppError>;

/// Application error with HTTP status code and optional extra response
/// fields (`needsUpgrade`, `keyAvailableAt`, ...).
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
    pub extras: Map<String, Value>,
}

impl AppError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            extras: Map::new(),
        }
    }

    #[must_use]
    pub fn with_extra(mut self, key: &str, value: Value) -> Self {
        self.extras.insert(key.to_string(), value);
        self
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.status, self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let retry_after = self
            .extras
            .get("retryAfter")
            .and_then(Value::as_u64);

        let mut body = Map::new();
        body.insert("success".to_string(), json!(false));
        body.insert("error".to_string(), json!(self.message));
        for (key, value) in self.extras {
            body.insert(key, value);
        }

        let mut response = (self.status, Json(Value::Object(body))).into_response();
        if let Some(seconds) = retry_after {
            if let Ok(value) = HeaderValue::from_str(&seconds.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

/// Convert `freshwax_core` errors to HTTP errors
impl From<freshwax_core::Error> for AppError {
    fn from(err: freshwax_core::Error) -> Self {
        use freshwax_core::Error;

        match err {
            Error::InvalidRequest(msg) => Self::bad_request(msg),
            Error::Unauthorized(msg) => Self::unauthorized(msg),
            Error::Forbidden(msg) => Self::forbidden(msg),
            Error::NotFound(msg) => Self::not_found(msg),
            Error::Conflict(msg) => Self::conflict(msg),
            Error::QuotaExceeded {
                message,
                needs_upgrade,
                can_request_event,
            } => Self::bad_request(message)
                .with_extra("needsUpgrade", json!(needs_upgrade))
                .with_extra("canRequestEvent", json!(can_request_event)),
            Error::RateLimited { retry_after_secs } => Self::new(
                StatusCode::TOO_MANY_REQUESTS,
                format!("Too many requests. Try again in {retry_after_secs}s"),
            )
            .with_extra("retryAfter", json!(retry_after_secs)),
            Error::Transport(msg) => {
                tracing::error!("Transport error: {msg}");
                Self::new(
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Service temporarily unavailable",
                )
            }
            Error::Serialization(e) => {
                tracing::error!("Serialization error: {e}");
                Self::internal("Data processing error")
            }
            Error::Internal(msg) => {
                tracing::error!("Internal error: {msg}");
                Self::internal("Internal server error")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quota_errors_carry_hints() {
        let err: AppError = freshwax_core::Error::quota("daily cap", true, true).into();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.extras["needsUpgrade"], json!(true));
        assert_eq!(err.extras["canRequestEvent"], json!(true));
    }

    #[test]
    fn rate_limits_map_to_429() {
        let err: AppError =
            freshwax_core::Error::RateLimited { retry_after_secs: 7 }.into();
        assert_eq!(err.status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(err.extras["retryAfter"], json!(7));
    }
}
