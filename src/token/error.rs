use axum::http::StatusCode;
use thiserror::Error;

/// Reasons a presented audio token is rejected
#[derive(Debug, Error, Clone, Copy, Eq, PartialEq)]
pub enum TokenError {
    #[error("Invalid token format")]
    InvalidFormat,

    #[error("Invalid token signature")]
    InvalidSignature,

    #[error("Token expired")]
    Expired,

    #[error("Token validation failed")]
    ValidationFailed,
}

impl TokenError {
    /// Every rejection maps to the same status so clients cannot tell
    /// a forged token from an expired one.
    pub fn status_code(&self) -> StatusCode {
        match self {
            TokenError::InvalidFormat
            | TokenError::InvalidSignature
            | TokenError::Expired
            | TokenError::ValidationFailed => StatusCode::FORBIDDEN,
        }
    }
}
