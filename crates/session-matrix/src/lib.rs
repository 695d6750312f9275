//! `matrix-sdk` implementations of the live session and session store
//! collaborators.

mod live;
mod store;

pub use live::MatrixLiveSession;
pub use store::{MatrixSessionStore, MatrixStoreConfig};

use matrix_sdk::{
    ClientBuildError, HttpError,
    ruma::api::client::error::{ErrorKind, RetryAfter},
};
use session_core::{SessionError, SessionErrorCategory, classify_http_status};

/// `Some(is_soft)` when the homeserver rejected the access token.
pub(crate) fn unknown_token(err: &matrix_sdk::Error) -> Option<bool> {
    match err.client_api_error_kind() {
        Some(ErrorKind::UnknownToken { soft_logout, .. }) => Some(*soft_logout),
        _ => None,
    }
}

pub(crate) fn map_matrix_http_error(err: HttpError) -> SessionError {
    let Some(client_err) = err.as_client_api_error() else {
        return SessionError::new(
            SessionErrorCategory::Network,
            "matrix_http_error",
            err.to_string(),
        );
    };

    let status = client_err.status_code.as_u16();
    let mapped = SessionError::new(
        classify_http_status(status),
        "matrix_http_error",
        client_err.to_string(),
    );
    match client_err.error_kind() {
        Some(ErrorKind::LimitExceeded {
            retry_after: Some(RetryAfter::Delay(delay)),
        }) => mapped.with_retry_after(*delay),
        _ => mapped,
    }
}

pub(crate) fn map_matrix_error(err: matrix_sdk::Error) -> SessionError {
    use matrix_sdk::Error;

    match err {
        Error::Http(http_err) => map_matrix_http_error(*http_err),
        Error::AuthenticationRequired => {
            SessionError::new(SessionErrorCategory::Auth, "auth_required", err.to_string())
        }
        Error::StateStore(_) | Error::EventCacheStore(_) | Error::MediaStore(_) | Error::Io(_) => {
            SessionError::new(SessionErrorCategory::Storage, "storage_error", err.to_string())
        }
        Error::SerdeJson(_) => SessionError::new(
            SessionErrorCategory::Serialization,
            "serde_json_error",
            err.to_string(),
        ),
        _ => SessionError::new(SessionErrorCategory::Internal, "matrix_error", err.to_string()),
    }
}

pub(crate) fn map_client_build_error(err: ClientBuildError) -> SessionError {
    SessionError::new(
        SessionErrorCategory::Config,
        "client_build_error",
        err.to_string(),
    )
}

pub(crate) fn map_io_error(operation: &str, err: std::io::Error) -> SessionError {
    SessionError::new(
        SessionErrorCategory::Storage,
        "storage_io_error",
        format!("{operation} failed: {err}"),
    )
}
