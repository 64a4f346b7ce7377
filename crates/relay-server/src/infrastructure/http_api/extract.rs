//! Request extractors.
//!
//! - `AuthUser` resolves the `Authorization: Bearer <token>` header to a user
//!   id, rejecting the request with 401 otherwise.
//! - `JsonBody` is `axum::Json` with its rejections answered in the API's
//!   `{"success": false, "message": ...}` envelope.

use axum::{
    extract::{rejection::JsonRejection, FromRequest, FromRequestParts, Request},
    http::request::Parts,
    Json,
};

use relay_core::{RelayError, UserId};

use super::error::ApiError;
use super::ApiState;

/// The authenticated caller of a protected route.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser(pub UserId);

impl FromRequestParts<ApiState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &ApiState) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| RelayError::unauthorized("Not authorized, no token"))?;

        let user_id = state.users.authenticate(token).await?;
        Ok(AuthUser(user_id))
    }
}

/// A JSON request body.  Malformed, mistyped or non-JSON bodies are rejected
/// with 400 and the usual error envelope.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonBody<T>(pub T);

impl<S, T> FromRequest<S> for JsonBody<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(JsonBody(value))
    }
}
