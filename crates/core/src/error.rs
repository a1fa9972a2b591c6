//! Error types for the Arcanum domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all Arcanum operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Caller input errors ---
    #[error("Input error: {0}")]
    Input(#[from] InputError),

    // --- Backend errors ---
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Malformed caller input. Fatal, never retried.
#[derive(Debug, Clone, Error)]
pub enum InputError {
    /// The card list is missing, null, not a list, or empty. The message
    /// carries the literal received value so the caller can see exactly
    /// what it sent.
    #[error("reading payload requires a non-empty card list; received {received}")]
    EmptyCardList { received: String },
}

impl InputError {
    /// Card list invariant violation for an empty (length-zero) list.
    pub fn empty_card_list() -> Self {
        Self::EmptyCardList {
            received: "empty list (length 0)".into(),
        }
    }

    /// Card list invariant violation for a missing, null, or non-list value.
    /// `value` is rendered literally into the message.
    pub fn bad_card_value(value: &serde_json::Value) -> Self {
        Self::EmptyCardList {
            received: value.to_string(),
        }
    }

    /// Card list invariant violation when the field is absent entirely.
    pub fn missing_card_list() -> Self {
        Self::EmptyCardList {
            received: "undefined".into(),
        }
    }
}

/// Failures from a generation backend.
///
/// Transient variants (`ApiError` 5xx, `RateLimited`, `Timeout`, `Network`,
/// `EmptyResponse`) are retried within the dispatcher's fixed bound; the rest
/// fail the backend immediately so the owning caller can advance to the next
/// available backend.
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by backend, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Backend not configured: {0}")]
    NotConfigured(String),

    #[error("Backend '{0}' is not available in this environment")]
    Unavailable(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Backend '{0}' returned an empty or unparseable response")]
    EmptyResponse(String),
}

impl BackendError {
    /// Whether another attempt at the same backend could plausibly succeed.
    /// An empty response is fatal for the backend: it answered, and what it
    /// said was unusable.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::ApiError { status_code, .. } => *status_code >= 500,
            Self::RateLimited { .. } | Self::Timeout(_) | Self::Network(_) => true,
            Self::AuthenticationFailed(_)
            | Self::NotConfigured(_)
            | Self::Unavailable(_)
            | Self::EmptyResponse(_) => false,
        }
    }
}
