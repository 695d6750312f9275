use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::state_machine::{SessionEvent, SessionState};

/// Broad error category used for logging, user-facing handling and retry behavior.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SessionErrorCategory {
    /// Invalid input, unsupported state, or other configuration issue.
    Config,
    /// Authentication/authorization failure.
    Auth,
    /// Transient network or transport failure.
    Network,
    /// Rate-limited by homeserver.
    RateLimited,
    /// Storage/keyring/local persistence failure.
    Storage,
    /// Serialization/deserialization failure.
    Serialization,
    /// Host platform refused or failed a request.
    Platform,
    /// Internal bug or invariant break.
    Internal,
}

/// Stable error payload returned by session collaborators.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Error)]
#[error("{category:?}:{code}: {message}")]
pub struct SessionError {
    /// High-level error category.
    pub category: SessionErrorCategory,
    /// Stable machine-readable error code.
    pub code: String,
    /// Human-readable message.
    pub message: String,
    /// Optional retry hint in milliseconds.
    pub retry_after_ms: Option<u64>,
}

impl SessionError {
    /// Construct a new session error.
    pub fn new(
        category: SessionErrorCategory,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            category,
            code: code.into(),
            message: message.into(),
            retry_after_ms: None,
        }
    }

    /// Attach a retry hint to the error.
    pub fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after_ms = Some(retry_after.as_millis().min(u128::from(u64::MAX)) as u64);
        self
    }

    /// Retry hint as a [`Duration`], when one was attached.
    pub fn retry_after(&self) -> Option<Duration> {
        self.retry_after_ms.map(Duration::from_millis)
    }

    /// Whether retrying the failed operation may succeed.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self.category,
            SessionErrorCategory::Network | SessionErrorCategory::RateLimited
        )
    }

    /// Build the error returned when no stored session is available to restore.
    pub fn missing_credentials() -> Self {
        Self::new(
            SessionErrorCategory::Auth,
            "missing_credentials",
            "no stored session is available for restore",
        )
    }
}

/// A `(state, event)` pair with no row in the transition table.
///
/// Seeing one means the orchestration invariants were violated by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("no transition from {state:?} on {event:?}")]
pub struct TransitionError {
    /// State the machine was in.
    pub state: SessionState,
    /// Event that was rejected.
    pub event: SessionEvent,
}

impl TransitionError {
    /// Stable error code, shared with [`SessionError`] payloads.
    pub const CODE: &'static str = "invalid_state_transition";
}

impl From<TransitionError> for SessionError {
    fn from(err: TransitionError) -> Self {
        Self::new(
            SessionErrorCategory::Internal,
            TransitionError::CODE,
            err.to_string(),
        )
    }
}

/// Failures reported by the host background-execution platform.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlatformError {
    /// No launcher was registered for the refresh task identifier.
    #[error("refresh task '{0}' is not registered")]
    RefreshTaskNotRegistered(String),
    /// The platform refused the request.
    #[error("platform rejected request: {0}")]
    Rejected(String),
}

impl From<PlatformError> for SessionError {
    fn from(err: PlatformError) -> Self {
        let code = match &err {
            PlatformError::RefreshTaskNotRegistered(_) => "refresh_task_not_registered",
            PlatformError::Rejected(_) => "platform_rejected",
        };
        Self::new(SessionErrorCategory::Platform, code, err.to_string())
    }
}

/// Map HTTP status codes to session error categories.
pub fn classify_http_status(status: u16) -> SessionErrorCategory {
    match status {
        401 | 403 => SessionErrorCategory::Auth,
        408 | 429 => SessionErrorCategory::RateLimited,
        400..=499 => SessionErrorCategory::Config,
        500..=599 => SessionErrorCategory::Network,
        _ => SessionErrorCategory::Internal,
    }
}
