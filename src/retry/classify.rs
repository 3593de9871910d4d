//! Error classification for retry decisions.
//!
//! Transport outcomes are distilled into a [`SyncFailure`]: a category, an
//! optional HTTP status, and the server's `Retry-After` hint. The retry
//! policy only ever sees this shape, which keeps the decision function pure
//! and easy to test.

use serde::{Deserialize, Serialize};

use crate::adapter::transport::{TransportError, TransportResponse};

/// Coarse failure category derived from the transport result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// The request never reached the server; there is no status code.
    Network,
    /// 5xx responses.
    Server,
    /// 4xx responses without a more specific category.
    Client,
    /// Socket-level timeout.
    Timeout,
    /// 422 Unprocessable Entity.
    Validation,
    /// 409 Conflict.
    Conflict,
    /// 401 or 403.
    Authentication,
    /// 429 Too Many Requests.
    RateLimit,
    Unknown,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Network => "network",
            ErrorCategory::Server => "server",
            ErrorCategory::Client => "client",
            ErrorCategory::Timeout => "timeout",
            ErrorCategory::Validation => "validation",
            ErrorCategory::Conflict => "conflict",
            ErrorCategory::Authentication => "authentication",
            ErrorCategory::RateLimit => "rate_limit",
            ErrorCategory::Unknown => "unknown",
        }
    }

    /// Maps an HTTP status code onto a category.
    pub fn from_status(status: u16) -> Self {
        match status {
            401 | 403 => ErrorCategory::Authentication,
            409 => ErrorCategory::Conflict,
            422 => ErrorCategory::Validation,
            429 => ErrorCategory::RateLimit,
            408 => ErrorCategory::Timeout,
            400..=499 => ErrorCategory::Client,
            500..=599 => ErrorCategory::Server,
            _ => ErrorCategory::Unknown,
        }
    }
}

/// Normalized failure handed to the retry policy and written to queue rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncFailure {
    pub category: ErrorCategory,
    pub status: Option<u16>,
    pub message: String,
    /// `Retry-After` in seconds, when the server supplied one.
    pub retry_after: Option<u64>,
}

impl SyncFailure {
    pub fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            status: None,
            message: message.into(),
            retry_after: None,
        }
    }

    /// Classifies an error response; `None` when the response is a success.
    pub fn from_response(response: &TransportResponse) -> Option<Self> {
        if response.is_success() {
            return None;
        }

        Some(Self {
            category: ErrorCategory::from_status(response.status),
            status: Some(response.status),
            message: format!("server responded with status {}", response.status),
            retry_after: response.retry_after,
        })
    }

    /// Classifies a transport-level failure (no status code available).
    pub fn from_transport(error: &TransportError) -> Self {
        let category = match error {
            TransportError::Network(_) => ErrorCategory::Network,
            TransportError::Timeout => ErrorCategory::Timeout,
            TransportError::Other(_) => ErrorCategory::Unknown,
        };

        Self {
            category,
            status: None,
            message: error.to_string(),
            retry_after: None,
        }
    }

    /// Stable error code written to the operation row and sync results.
    pub fn code(&self) -> &'static str {
        match (self.category, self.status) {
            (ErrorCategory::Network, _) => "NETWORK",
            (ErrorCategory::Timeout, _) => "TIMEOUT",
            (ErrorCategory::Server, _) => "SERVER_ERROR",
            (ErrorCategory::RateLimit, _) => "RATE_LIMITED",
            (ErrorCategory::Conflict, _) => "CONFLICT",
            (ErrorCategory::Validation, _) => "VALIDATION",
            (ErrorCategory::Authentication, Some(403)) => "FORBIDDEN",
            (ErrorCategory::Authentication, _) => "AUTHENTICATION",
            (ErrorCategory::Client, Some(404)) => "NOT_FOUND",
            (ErrorCategory::Client, _) => "CLIENT_ERROR",
            (ErrorCategory::Unknown, _) => "UNKNOWN",
        }
    }
}
