use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchooldayError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unknown channel: {0}")]
    UnknownChannel(String),

    #[error("Invalid date: {0}")]
    InvalidDate(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SchooldayError {
    /// Short error code string returned to HTTP clients.
    pub fn code(&self) -> &'static str {
        match self {
            SchooldayError::Config(_) => "CONFIG_ERROR",
            SchooldayError::UnknownChannel(_) => "UNKNOWN_CHANNEL",
            SchooldayError::InvalidDate(_) => "INVALID_DATE",
            SchooldayError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, SchooldayError>;
