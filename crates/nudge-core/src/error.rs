use thiserror::Error;

#[derive(Debug, Error)]
pub enum NudgeError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid time of day: {0:?} (expected HH:MM)")]
    InvalidTimeOfDay(String),

    #[error("Invalid UTC offset: {0:?} (expected +HH:MM or -HH:MM)")]
    InvalidOffset(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl NudgeError {
    /// Short error code string used in structured log fields.
    pub fn code(&self) -> &'static str {
        match self {
            NudgeError::Config(_) => "CONFIG_ERROR",
            NudgeError::InvalidTimeOfDay(_) => "INVALID_TIME_OF_DAY",
            NudgeError::InvalidOffset(_) => "INVALID_OFFSET",
            NudgeError::Serialization(_) => "SERIALIZATION_ERROR",
            NudgeError::Io(_) => "IO_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, NudgeError>;
