//! `/api/auth/*`: accounts, tokens and the pairing lifecycle.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Deserialize;
use serde_json::json;

use relay_core::{DeviceDescriptor, RelayError};

use super::error::ApiError;
use super::extract::{AuthUser, JsonBody};
use super::ApiState;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RegisterBody {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LoginBody {
    pub email: String,
    pub password: String,
}

/// Device fields shared by `generate-qrcode` and `verify-qrcode`.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PairingBody {
    pub user_id: Option<String>,
    pub session_id: String,
    pub device_id: String,
    pub device_type: String,
    pub device_name: String,
}

impl PairingBody {
    fn descriptor(&self) -> Result<DeviceDescriptor, RelayError> {
        DeviceDescriptor::parse(&self.device_id, &self.device_type, &self.device_name)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DisconnectBody {
    pub session_id: String,
    pub device_id: Option<String>,
}

pub async fn register(
    State(state): State<ApiState>,
    JsonBody(body): JsonBody<RegisterBody>,
) -> Result<impl IntoResponse, ApiError> {
    let credentials = state
        .users
        .register(&body.name, &body.email, &body.password)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "token": credentials.token,
            "user": credentials.profile,
        })),
    ))
}

pub async fn login(
    State(state): State<ApiState>,
    JsonBody(body): JsonBody<LoginBody>,
) -> Result<impl IntoResponse, ApiError> {
    let credentials = state.users.login(&body.email, &body.password).await?;
    Ok(Json(json!({
        "success": true,
        "token": credentials.token,
        "user": credentials.profile,
    })))
}

pub async fn profile(
    State(state): State<ApiState>,
    AuthUser(user): AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    let profile = state.users.profile(user).await?;
    Ok(Json(json!({ "success": true, "user": profile })))
}

pub async fn generate_qrcode(
    State(state): State<ApiState>,
    AuthUser(user): AuthUser,
    JsonBody(body): JsonBody<PairingBody>,
) -> Result<impl IntoResponse, ApiError> {
    // The caller's identity comes from the token; a body `userId` may only
    // repeat it.
    if let Some(claimed) = body.user_id.as_deref().filter(|s| !s.is_empty()) {
        if claimed != user.to_string() {
            return Err(RelayError::validation("userId does not match the authenticated user").into());
        }
    }
    let issued = state.pairing.issue(user, &body.descriptor()?).await?;
    Ok(Json(json!({
        "success": true,
        "qrCode": issued.qr_code,
        "sessionId": issued.token,
        "expiresAt": issued.expires_at,
    })))
}

pub async fn verify_qrcode(
    State(state): State<ApiState>,
    AuthUser(user): AuthUser,
    JsonBody(body): JsonBody<PairingBody>,
) -> Result<impl IntoResponse, ApiError> {
    if body.session_id.trim().is_empty() {
        return Err(RelayError::validation("sessionId is required").into());
    }
    let session = state
        .pairing
        .verify(user, body.session_id.trim(), &body.descriptor()?)
        .await?;
    Ok(Json(json!({
        "success": true,
        "message": "Devices paired successfully",
        "session": session,
    })))
}

pub async fn disconnect(
    State(state): State<ApiState>,
    AuthUser(user): AuthUser,
    JsonBody(body): JsonBody<DisconnectBody>,
) -> Result<impl IntoResponse, ApiError> {
    state.pairing.disconnect(user, body.session_id.trim()).await?;
    Ok(Json(json!({
        "success": true,
        "message": "Devices disconnected successfully",
    })))
}
