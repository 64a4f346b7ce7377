//! Translation of [`RelayError`] into HTTP responses.
//!
//! Every failure leaves the API as `{"success": false, "message": "..."}`.
//! Storage faults are logged in full and answered with a bare
//! `"Server Error"` so no internal detail reaches the client.

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::error;

use relay_core::{ErrorKind, RelayError};

/// Handler error type.  Wraps a [`RelayError`] so `?` works in handlers.
#[derive(Debug)]
pub struct ApiError(pub RelayError);

impl From<RelayError> for ApiError {
    fn from(e: RelayError) -> Self {
        Self(e)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(RelayError::validation(rejection.body_text()))
    }
}

/// HTTP status for each error kind.
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation | ErrorKind::Expired => StatusCode::BAD_REQUEST,
        ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Conflict | ErrorKind::AlreadyPaired => StatusCode::CONFLICT,
        ErrorKind::Storage => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.0.kind();
        let message = match kind {
            ErrorKind::Storage => {
                error!("request failed: {}", self.0);
                "Server Error".to_string()
            }
            _ => self.0.to_string(),
        };
        let body = Json(json!({ "success": false, "message": message }));
        (status_for(kind), body).into_response()
    }
}
