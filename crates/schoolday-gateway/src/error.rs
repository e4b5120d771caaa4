use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use schoolday_core::SchooldayError;
use schoolday_history::HistoryError;
use schoolday_schedule::ScheduleError;
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Everything a handler can fail with, mapped onto an HTTP status.
///
/// Validation problems are returned verbatim with 400. Store failures are
/// logged with their context and surface as a generic 500.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Unauthorized. Set 'Authorization: Bearer <token>' header.")]
    Unauthorized,

    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Core(#[from] SchooldayError),

    #[error(transparent)]
    Schedule(#[from] ScheduleError),

    #[error(transparent)]
    History(#[from] HistoryError),

    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl ApiError {
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Unauthorized => "UNAUTHORIZED",
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::Core(e) => e.code(),
            ApiError::Schedule(e) => e.code(),
            ApiError::History(e) => e.code(),
            ApiError::Task(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Core(SchooldayError::UnknownChannel(_) | SchooldayError::InvalidDate(_)) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Schedule(e) if e.is_validation() => StatusCode::BAD_REQUEST,
            ApiError::History(HistoryError::Validation(_)) => StatusCode::BAD_REQUEST,
            ApiError::History(HistoryError::Schedule(e)) if e.is_validation() => {
                StatusCode::BAD_REQUEST
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status.is_server_error() {
            error!(code = self.code(), error = %self, "request failed");
            "internal error".to_string()
        } else {
            self.to_string()
        };
        (
            status,
            Json(json!({
                "success": false,
                "error": message,
                "code": self.code(),
            })),
        )
            .into_response()
    }
}

/// Run blocking store work off the async runtime.
pub async fn blocking<T, E, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, E> + Send + 'static,
    T: Send + 'static,
    E: Into<ApiError> + Send + 'static,
{
    tokio::task::spawn_blocking(f).await?.map_err(Into::into)
}
