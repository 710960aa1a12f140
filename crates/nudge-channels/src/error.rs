use thiserror::Error;

/// Errors raised while delivering a notification.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The remote service could not be reached.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// The remote service refused or failed to deliver the message.
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// The bot token was rejected.
    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    #[error("Operation timed out after {ms}ms")]
    Timeout { ms: u64 },

    /// The channel is not configured or its configuration is unusable.
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl From<reqwest::Error> for ChannelError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ChannelError::Timeout { ms: 0 }
        } else if e.is_connect() {
            ChannelError::ConnectionFailed(e.to_string())
        } else {
            ChannelError::SendFailed(e.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, ChannelError>;
