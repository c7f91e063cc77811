//! Backend transport error types

use thiserror::Error;

/// Transport failure on any backend call, with classification
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Network, message)
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Decode, message)
    }

    /// Classify an HTTP status returned by the upstream API
    pub fn from_status(status: u16, body: &str) -> Self {
        let kind = match status {
            401 | 403 => TransportErrorKind::Auth,
            404 => TransportErrorKind::NotFound,
            429 => TransportErrorKind::RateLimit,
            400..=499 => TransportErrorKind::InvalidRequest,
            500..=599 => TransportErrorKind::ServerError,
            _ => TransportErrorKind::Unknown,
        };
        Self::new(kind, format!("HTTP {status}: {body}"))
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::decode(e.to_string())
        } else {
            Self::network(e.to_string())
        }
    }
}

/// Error classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// Connection failures, timeouts
    Network,
    /// Rate limited (429)
    RateLimit,
    /// Server error (5xx)
    ServerError,
    /// Authentication failed (401, 403)
    Auth,
    /// Bad request (400 and other 4xx)
    InvalidRequest,
    /// Unknown thread, run or assistant (404)
    NotFound,
    /// Response body did not match the expected shape
    Decode,
    Unknown,
}

impl TransportErrorKind {
    /// Whether a fresh attempt could succeed. Nothing retries automatically;
    /// this only feeds log fields and user-facing hints.
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::Network | Self::RateLimit | Self::ServerError)
    }
}
