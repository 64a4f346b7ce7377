//! `/api/users/*`: preferences, devices, sessions and profile.

use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;

use relay_core::PreferencesPatch;

use crate::application::users::ProfileUpdate;

use super::error::ApiError;
use super::extract::{AuthUser, JsonBody};
use super::ApiState;

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RenameBody {
    pub device_name: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ProfileBody {
    pub name: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PasswordBody {
    pub current_password: String,
    pub new_password: String,
}

pub async fn update_notification_settings(
    State(state): State<ApiState>,
    AuthUser(user): AuthUser,
    JsonBody(patch): JsonBody<PreferencesPatch>,
) -> Result<impl IntoResponse, ApiError> {
    let settings = state.users.update_notification_settings(user, patch).await?;
    Ok(Json(json!({
        "success": true,
        "notificationSettings": settings,
    })))
}

pub async fn list_devices(
    State(state): State<ApiState>,
    AuthUser(user): AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    let devices = state.devices.list_for_user(user).await?;
    Ok(Json(json!({ "success": true, "devices": devices })))
}

pub async fn delete_device(
    State(state): State<ApiState>,
    AuthUser(user): AuthUser,
    Path(device_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state.devices.remove(user, &device_id).await?;
    Ok(Json(json!({
        "success": true,
        "message": "Device deleted successfully",
    })))
}

pub async fn rename_device(
    State(state): State<ApiState>,
    AuthUser(user): AuthUser,
    Path(device_id): Path<String>,
    JsonBody(body): JsonBody<RenameBody>,
) -> Result<impl IntoResponse, ApiError> {
    let device = state
        .devices
        .rename(user, &device_id, &body.device_name)
        .await?;
    Ok(Json(json!({ "success": true, "device": device })))
}

pub async fn list_sessions(
    State(state): State<ApiState>,
    AuthUser(user): AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    let sessions = state.pairing.list_sessions(user, true).await?;
    Ok(Json(json!({ "success": true, "sessions": sessions })))
}

pub async fn update_profile(
    State(state): State<ApiState>,
    AuthUser(user): AuthUser,
    JsonBody(body): JsonBody<ProfileBody>,
) -> Result<impl IntoResponse, ApiError> {
    let profile = state
        .users
        .update_profile(
            user,
            ProfileUpdate {
                name: body.name,
                email: body.email,
            },
        )
        .await?;
    Ok(Json(json!({ "success": true, "user": profile })))
}

pub async fn change_password(
    State(state): State<ApiState>,
    AuthUser(user): AuthUser,
    JsonBody(body): JsonBody<PasswordBody>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .users
        .change_password(user, &body.current_password, &body.new_password)
        .await?;
    Ok(Json(json!({
        "success": true,
        "message": "Password updated successfully",
    })))
}
