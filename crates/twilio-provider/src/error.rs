//! Error types for twilio-provider

use thiserror::Error;

/// twilio-provider error type
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Twilio credentials not set: {0}")]
    CredentialsNotSet(&'static str),

    #[error("Media cannot be empty")]
    MissingMedia,

    #[error("Inbound message has no media URL")]
    NoMediaUrl,

    #[error("Twilio API error ({status}): {message}")]
    Api {
        status: u16,
        code: Option<i64>,
        message: String,
    },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid media token")]
    InvalidToken,

    #[error("Crypto error: {0}")]
    Crypto(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Server error: {0}")]
    Server(String),
}

impl ProviderError {
    /// Whether Twilio rejected the account credentials
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, ProviderError::Api { status: 401, .. })
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, ProviderError>;
