use thiserror::Error;

/// Errors that can occur within the schedule store.
#[derive(Debug, Error)]
pub enum ScheduleError {
    /// The request is malformed for this school/column: hour out of range,
    /// column type change, unknown school or neighbour column.
    #[error("validation error: {0}")]
    Validation(String),

    /// A SQLite operation failed.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A stored JSON column could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ScheduleError {
    pub fn code(&self) -> &'static str {
        match self {
            ScheduleError::Validation(_) => "VALIDATION_ERROR",
            ScheduleError::Database(_) => "DATABASE_ERROR",
            ScheduleError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, ScheduleError::Validation(_))
    }
}

pub type Result<T> = std::result::Result<T, ScheduleError>;
