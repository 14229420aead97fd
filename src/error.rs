use thiserror::Error;

/// Type alias for Result with ExtractorError
pub type Result<T> = std::result::Result<T, ExtractorError>;

/// Error types for the contact extraction pipeline
#[derive(Error, Debug)]
pub enum ExtractorError {
    /// Missing, unreadable or invalid configuration file
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Network-level failure reaching an account's mail server
    #[error("Connection error for account '{account}': {message}")]
    ConnectionError { account: String, message: String },

    /// Login rejected or credential reference could not be resolved
    #[error("Authentication failed for account '{account}': {message}")]
    AuthError { account: String, message: String },

    /// A rule matched but could not be turned into a contact
    #[error("Extraction error (rule '{rule}', message {uid}): {message}")]
    ExtractionError {
        rule: String,
        uid: u32,
        message: String,
    },

    /// Message bytes could not be parsed as RFC 5322 mail
    #[error("Invalid message format: {0}")]
    InvalidMessageFormat(String),

    /// IO error (file operations, etc.)
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Generic catch-all error
    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl ExtractorError {
    pub fn connection(account: impl Into<String>, message: impl Into<String>) -> Self {
        ExtractorError::ConnectionError {
            account: account.into(),
            message: message.into(),
        }
    }

    pub fn auth(account: impl Into<String>, message: impl Into<String>) -> Self {
        ExtractorError::AuthError {
            account: account.into(),
            message: message.into(),
        }
    }

    /// Errors that only cost the current account
    pub fn is_account_scoped(&self) -> bool {
        matches!(
            self,
            ExtractorError::ConnectionError { .. } | ExtractorError::AuthError { .. }
        )
    }

    /// Errors that only cost a single message or message/rule pair
    pub fn is_message_scoped(&self) -> bool {
        matches!(
            self,
            ExtractorError::ExtractionError { .. } | ExtractorError::InvalidMessageFormat(_)
        )
    }
}
