//! # Payment Error Types
//!
//! Typed error handling for the checkout-session engine.
//! All fallible operations return `Result<T, PaymentError>`.
//!
//! An unrecognized navigation URL is not an error: sessions report it as
//! [`NavigationDisposition::Ignored`](crate::session::NavigationDisposition).

use thiserror::Error;

/// Core error type for all payment operations
#[derive(Debug, Error)]
pub enum PaymentError {
    /// Configuration errors (missing keys, invalid config)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Invalid request data, rejected before any network activity
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Operation not allowed in the session's current state
    #[error("Invalid session state: {0}")]
    InvalidState(String),

    /// Currency not supported by the gateway
    #[error("Unsupported currency: {currency}")]
    UnsupportedCurrency { currency: String },

    /// No session for the given handle or reference
    #[error("Session not found: {session}")]
    SessionNotFound { session: String },

    /// A terminal outcome was already delivered for this session
    #[error("Session {session} already completed")]
    AlreadyCompleted { session: String },

    /// Status lookup failed (network or parse)
    #[error("Requery error: {0}")]
    RequeryError(String),

    /// Timed out waiting for the gateway
    #[error("timeout")]
    Timeout,

    /// Payment gateway API error
    #[error("Provider error [{provider}]: {message}")]
    ProviderError { provider: String, message: String },

    /// Network/HTTP error communicating with the gateway
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Gateway signature did not verify
    #[error("Signature mismatch: {0}")]
    SignatureMismatch(String),

    /// Backend-post callback could not be parsed
    #[error("Callback parse error: {0}")]
    CallbackParseError(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Internal error (should not happen)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PaymentError {
    /// Returns true if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PaymentError::NetworkError(_)
                | PaymentError::Timeout
                | PaymentError::RequeryError(_)
                | PaymentError::ProviderError { .. }
        )
    }

    /// Returns the HTTP status code appropriate for this error
    pub fn status_code(&self) -> u16 {
        match self {
            PaymentError::Configuration(_) => 500,
            PaymentError::InvalidRequest(_) => 400,
            PaymentError::InvalidState(_) => 409,
            PaymentError::UnsupportedCurrency { .. } => 400,
            PaymentError::SessionNotFound { .. } => 404,
            PaymentError::AlreadyCompleted { .. } => 409,
            PaymentError::RequeryError(_) => 502,
            PaymentError::Timeout => 504,
            PaymentError::ProviderError { .. } => 502,
            PaymentError::NetworkError(_) => 503,
            PaymentError::SignatureMismatch(_) => 401,
            PaymentError::CallbackParseError(_) => 400,
            PaymentError::Serialization(_) => 500,
            PaymentError::Internal(_) => 500,
        }
    }
}

impl From<url::ParseError> for PaymentError {
    fn from(err: url::ParseError) -> Self {
        PaymentError::InvalidRequest(format!("Invalid URL: {}", err))
    }
}

/// Result type alias for payment operations
pub type PaymentResult<T> = Result<T, PaymentError>;
