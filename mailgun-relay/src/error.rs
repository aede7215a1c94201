//! Error kinds produced while handling a single webhook request.
//!
//! Every variant is terminal for the request. The `Display` output is the
//! message that ends up in the response body.

use thiserror::Error;

/// Backend category, used to name the failing side of a dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceCategory {
    Notification,
    Storage,
}

impl std::fmt::Display for ServiceCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceCategory::Notification => f.write_str("notification"),
            ServiceCategory::Storage => f.write_str("storage"),
        }
    }
}

/// Errors raised by the verification and dispatch pipeline.
#[derive(Debug, Error)]
pub enum WebhookError {
    /// A required configuration value is missing or blank.
    #[error("{0}")]
    Configuration(String),

    /// The request body is not JSON or lacks a required section.
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    /// The signature does not match the signing key.
    #[error("Unauthorised request")]
    Unauthorized,

    /// Only POST is dispatched.
    #[error("Unsupported method \"{0}\"")]
    UnsupportedMethod(String),

    /// The configured backend identifier is not one we can dispatch to.
    ///
    /// The message is the same for both categories and does not name the
    /// identifier; deployed clients match on it.
    #[error("Please provide a service")]
    UnsupportedService {
        category: ServiceCategory,
        name: String,
    },

    /// The backend call itself failed (network, auth, quota).
    #[error("{0}")]
    Backend(String),
}

impl WebhookError {
    /// HTTP status code for this error, as the string the invocation
    /// contract carries.
    pub fn status_code(&self) -> &'static str {
        match self {
            WebhookError::Configuration(_) => "500",
            WebhookError::MalformedPayload(_)
            | WebhookError::Unauthorized
            | WebhookError::UnsupportedMethod(_)
            | WebhookError::UnsupportedService { .. }
            | WebhookError::Backend(_) => "400",
        }
    }
}

/// Failure reported by an external backend client.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct BackendError {
    pub message: String,
}

impl BackendError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<BackendError> for WebhookError {
    fn from(err: BackendError) -> Self {
        WebhookError::Backend(err.message)
    }
}
