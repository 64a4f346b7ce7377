//! `/api/notifications/*`: submission, listing, read state and stats.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use relay_core::{NewNotification, NotificationId, RelayError};

use crate::application::notifications::{ListRequest, Submission};

use super::error::ApiError;
use super::extract::{AuthUser, JsonBody};
use super::ApiState;

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ListParams {
    pub limit: Option<usize>,
    pub skip: Option<usize>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub is_read: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct TypeParam {
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

/// `{"success": true, ...body}`.
#[derive(Serialize)]
struct Envelope<T> {
    success: bool,
    #[serde(flatten)]
    body: T,
}

fn parse_id(raw: &str) -> Result<NotificationId, RelayError> {
    Uuid::parse_str(raw).map_err(|_| RelayError::not_found("Notification not found"))
}

pub async fn create(
    State(state): State<ApiState>,
    AuthUser(user): AuthUser,
    JsonBody(body): JsonBody<NewNotification>,
) -> Result<impl IntoResponse, ApiError> {
    let response = match state.notifications.submit(user, body).await? {
        Submission::Accepted {
            notification,
            delivered,
        } => (
            StatusCode::CREATED,
            Json(json!({
                "success": true,
                "notification": notification,
                "delivered": delivered,
            })),
        ),
        Submission::Blocked(_) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "message": "Notification blocked by user settings",
                "delivered": false,
            })),
        ),
    };
    Ok(response)
}

pub async fn list(
    State(state): State<ApiState>,
    AuthUser(user): AuthUser,
    Query(params): Query<ListParams>,
) -> Result<impl IntoResponse, ApiError> {
    let page = state
        .notifications
        .list(
            user,
            ListRequest {
                limit: params.limit,
                skip: params.skip,
                kind: params.kind,
                is_read: params.is_read,
            },
        )
        .await?;
    Ok(Json(Envelope {
        success: true,
        body: page,
    }))
}

pub async fn stats(
    State(state): State<ApiState>,
    AuthUser(user): AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    let stats = state.notifications.stats(user).await?;
    Ok(Json(Envelope {
        success: true,
        body: stats,
    }))
}

pub async fn mark_read(
    State(state): State<ApiState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let notification = state.notifications.mark_read(user, parse_id(&id)?).await?;
    Ok(Json(json!({ "success": true, "notification": notification })))
}

pub async fn mark_all_read(
    State(state): State<ApiState>,
    AuthUser(user): AuthUser,
    Query(params): Query<TypeParam>,
) -> Result<impl IntoResponse, ApiError> {
    let count = state
        .notifications
        .mark_all_read(user, params.kind.as_deref())
        .await?;
    Ok(Json(json!({
        "success": true,
        "message": "Notifications marked as read",
        "count": count,
    })))
}

pub async fn delete(
    State(state): State<ApiState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state.notifications.delete(user, parse_id(&id)?).await?;
    Ok(Json(json!({
        "success": true,
        "message": "Notification deleted successfully",
    })))
}
