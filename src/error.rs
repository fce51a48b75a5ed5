//! Error types for the library client

use thiserror::Error;
use validator::ValidationErrors;

/// Main client error type.
///
/// Every variant carries only a display message: callers show it to the
/// user and never branch on HTTP status codes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// Login, registration or identity resolution failed
    #[error("{0}")]
    Auth(String),

    /// Required fields missing or malformed, caught before submission
    #[error("{0}")]
    Validation(String),

    /// Non-success response from the backend
    #[error("{0}")]
    Request(String),

    /// Transport failure or server-side outage
    #[error("{0}")]
    Network(String),

    /// Token storage failure
    #[error("Storage error: {0}")]
    Storage(String),
}

impl ClientError {
    /// Whether a read may be transparently retried after this error
    pub fn is_transient(&self) -> bool {
        matches!(self, ClientError::Network(_))
    }

    /// Re-tag a request failure as an authentication failure, keeping its message
    pub fn into_auth(self) -> Self {
        match self {
            ClientError::Request(msg) | ClientError::Network(msg) => ClientError::Auth(msg),
            other => other,
        }
    }
}

impl From<ValidationErrors> for ClientError {
    fn from(errors: ValidationErrors) -> Self {
        let mut messages: Vec<String> = errors
            .field_errors()
            .into_iter()
            .flat_map(|(field, errs)| {
                errs.iter().map(move |e| match &e.message {
                    Some(msg) => msg.to_string(),
                    None => format!("{} is invalid", field),
                })
            })
            .collect();

        // HashMap order is unstable
        messages.sort();
        messages.dedup();

        if messages.is_empty() {
            ClientError::Validation("Invalid input".to_string())
        } else {
            ClientError::Validation(messages.join("; "))
        }
    }
}

impl From<std::io::Error> for ClientError {
    fn from(e: std::io::Error) -> Self {
        ClientError::Storage(e.to_string())
    }
}

/// Result type alias for client operations
pub type ClientResult<T> = Result<T, ClientError>;
