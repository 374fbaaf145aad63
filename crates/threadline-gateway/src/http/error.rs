use axum::{http::StatusCode, Json};
use serde::Serialize;
use threadline_sessions::SessionError;
use tracing::{error, warn};

#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub error: String,
}

/// Rejection shape shared by all JSON endpoints.
pub type ApiError = (StatusCode, Json<ApiErrorBody>);

pub fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ApiErrorBody {
            error: message.into(),
        }),
    )
}

/// Map a session failure onto an HTTP status.
pub fn session_error(e: SessionError) -> ApiError {
    let status = match &e {
        SessionError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
        SessionError::StorageUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        SessionError::CorruptRecord { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        error!(code = e.code(), error = %e, "session storage failure");
    } else {
        warn!(code = e.code(), error = %e, "rejected session request");
    }
    api_error(status, e.to_string())
}
