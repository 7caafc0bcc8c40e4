//! Transport error types.

use thiserror::Error;

/// Error raised by an [`LlmDriver`](super::LlmDriver) while sending a turn.
///
/// Every failure is terminal for the turn that produced it; the kind is kept
/// for logging and for the `code` attached to the error event.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct LlmError {
    pub kind: LlmErrorKind,
    pub message: String,
}

impl LlmError {
    pub fn new(kind: LlmErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(LlmErrorKind::Network, message)
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(LlmErrorKind::Auth, message)
    }

    pub fn rate_limit(message: impl Into<String>) -> Self {
        Self::new(LlmErrorKind::RateLimit, message)
    }

    pub fn server_error(message: impl Into<String>) -> Self {
        Self::new(LlmErrorKind::ServerError, message)
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(LlmErrorKind::InvalidRequest, message)
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::new(LlmErrorKind::InvalidResponse, message)
    }

    pub fn missing_credential() -> Self {
        Self::new(
            LlmErrorKind::MissingCredential,
            "No API key configured for the model service",
        )
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(LlmErrorKind::Unknown, message)
    }

    /// Classify a non-success HTTP status returned by the model service.
    pub fn from_status(status: reqwest::StatusCode, detail: &str) -> Self {
        match status.as_u16() {
            400 => Self::invalid_request(format!("Invalid request: {detail}")),
            401 | 403 => Self::auth(format!("Authentication failed: {detail}")),
            429 => Self::rate_limit(format!("Rate limit exceeded: {detail}")),
            500..=599 => Self::server_error(format!("Server error: {detail}")),
            _ => Self::unknown(format!("HTTP {status}: {detail}")),
        }
    }
}

impl From<reqwest::Error> for LlmError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::network(format!("Request timeout: {e}"))
        } else if e.is_connect() {
            Self::network(format!("Connection failed: {e}"))
        } else if e.is_decode() || e.is_body() {
            Self::network(format!("Failed to read response: {e}"))
        } else {
            Self::unknown(format!("Request failed: {e}"))
        }
    }
}

impl From<serde_json::Error> for LlmError {
    fn from(e: serde_json::Error) -> Self {
        Self::invalid_response(format!("Malformed response payload: {e}"))
    }
}

/// Error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmErrorKind {
    /// Network issues, dropped connections.
    Network,
    /// Authentication failed (401, 403).
    Auth,
    /// Rate limited (429).
    RateLimit,
    /// Server error (5xx).
    ServerError,
    /// Bad request (400).
    InvalidRequest,
    /// The service answered with something we could not interpret.
    InvalidResponse,
    /// No credential was configured at startup.
    MissingCredential,
    /// Anything else.
    Unknown,
}

impl LlmErrorKind {
    /// Stable code attached to error events sent to the browser.
    pub fn code(self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Auth => "auth",
            Self::RateLimit => "rate_limit",
            Self::ServerError => "server_error",
            Self::InvalidRequest => "invalid_request",
            Self::InvalidResponse => "invalid_response",
            Self::MissingCredential => "missing_credential",
            Self::Unknown => "unknown",
        }
    }
}
