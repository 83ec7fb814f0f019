use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("server start failure: {0}")]
    StartServer(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0} already exists")]
    AlreadyExists(&'static str),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("media store error: {0}")]
    MediaStore(String),

    #[error("internal server error")]
    Internal,
}

impl AppError {
    /// Transient store failures the caller may retry with backoff; everything
    /// else is permanent from the caller's point of view.
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::Database(e) => matches!(
                e,
                sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_)
            ),
            AppError::MediaStore(_) => true,
            _ => false,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::AlreadyExists(_) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let body = axum::Json(serde_json::json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_covers_pool_exhaustion_only() {
        assert!(AppError::Database(sqlx::Error::PoolTimedOut).is_retryable());
        assert!(AppError::MediaStore("timeout".into()).is_retryable());
        assert!(!AppError::NotFound("message").is_retryable());
        assert!(!AppError::BadRequest("nope".into()).is_retryable());
    }

    #[test]
    fn status_codes() {
        assert_eq!(
            AppError::NotFound("message").status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::AlreadyExists("delivery ledger").status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(AppError::Internal.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
