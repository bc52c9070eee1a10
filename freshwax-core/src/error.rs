use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("{message}")]
    QuotaExceeded {
        message: String,
        /// Upgrading the subscription would raise the limit.
        needs_upgrade: bool,
        /// An approved event request would raise the limit.
        can_request_event: bool,
    },

    #[error("Rate limit exceeded. Try again in {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn quota(message: impl Into<String>, needs_upgrade: bool, can_request_event: bool) -> Self {
        Error::QuotaExceeded {
            message: message.into(),
            needs_upgrade,
            can_request_event,
        }
    }

    /// True for store/transport failures worth retrying.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Error::Transport(_))
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Error::NotFound("Document not found".to_string()),
            other => Error::Transport(format!("database: {other}")),
        }
    }
}

impl From<redis::RedisError> for Error {
    fn from(err: redis::RedisError) -> Self {
        Error::Transport(format!("redis: {err}"))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
