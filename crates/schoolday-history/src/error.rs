use schoolday_schedule::ScheduleError;
use thiserror::Error;

/// Errors that can occur within archival and recommendation.
#[derive(Debug, Error)]
pub enum HistoryError {
    /// Underlying SQLite / rusqlite error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Reading the live schedule failed.
    #[error("Schedule store error: {0}")]
    Schedule(#[from] ScheduleError),

    /// Request parameters out of range (e.g. weekday 0).
    #[error("Invalid request: {0}")]
    Validation(String),

    /// A stored history row could not be decoded.
    #[error("Corrupt history row: {0}")]
    Corrupt(String),

    /// A blocking worker task panicked or was cancelled.
    #[error("Background task failed: {0}")]
    Task(String),
}

impl HistoryError {
    pub fn code(&self) -> &'static str {
        match self {
            HistoryError::Database(_) => "DATABASE_ERROR",
            HistoryError::Schedule(e) => e.code(),
            HistoryError::Validation(_) => "VALIDATION_ERROR",
            HistoryError::Corrupt(_) => "DATA_ERROR",
            HistoryError::Task(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<tokio::task::JoinError> for HistoryError {
    fn from(e: tokio::task::JoinError) -> Self {
        HistoryError::Task(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, HistoryError>;
