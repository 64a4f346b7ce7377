//! REST API built on `axum`.
//!
//! Every route lives under `/api`.  Protected routes take an [`AuthUser`]
//! extractor, which resolves the bearer token before the handler runs.
//! Handlers are thin: they translate JSON to use-case calls and back, and
//! let [`ApiError`] turn a [`relay_core::RelayError`] into a status code.
//!
//! | Method | Path                                  | Use case                      |
//! |--------|---------------------------------------|-------------------------------|
//! | POST   | `/api/auth/register`                  | `UserService::register`       |
//! | POST   | `/api/auth/login`                     | `UserService::login`          |
//! | GET    | `/api/auth/profile`                   | `UserService::profile`        |
//! | POST   | `/api/auth/generate-qrcode`           | `PairingService::issue`       |
//! | POST   | `/api/auth/verify-qrcode`             | `PairingService::verify`      |
//! | POST   | `/api/auth/disconnect`                | `PairingService::disconnect`  |
//! | POST   | `/api/notifications`                  | `NotificationPipeline::submit`|
//! | GET    | `/api/notifications`                  | `NotificationPipeline::list`  |
//! | GET    | `/api/notifications/stats`            | `NotificationPipeline::stats` |
//! | PUT    | `/api/notifications/read-all`         | `mark_all_read`               |
//! | PUT    | `/api/notifications/{id}/read`        | `mark_read`                   |
//! | DELETE | `/api/notifications/{id}`             | `delete`                      |
//! | GET    | `/api/users/devices`                  | `DeviceRegistry::list_for_user` |
//! | PUT    | `/api/users/devices/{id}`             | `DeviceRegistry::rename`      |
//! | DELETE | `/api/users/devices/{id}`             | `DeviceRegistry::remove`      |
//! | GET    | `/api/users/sessions`                 | `PairingService::list_sessions` |
//! | PUT    | `/api/users/notification-settings`    | `update_notification_settings`|
//! | PUT    | `/api/users/profile`                  | `update_profile`              |
//! | PUT    | `/api/users/change-password`          | `change_password`             |

pub mod auth;
pub mod error;
pub mod extract;
pub mod notifications;
pub mod users;

use anyhow::Context;
use axum::{
    routing::{get, post, put},
    Router,
};
use tokio::net::TcpListener;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

use crate::application::devices::DeviceRegistry;
use crate::application::notifications::NotificationPipeline;
use crate::application::pairing::PairingService;
use crate::application::users::UserService;

pub use error::ApiError;
pub use extract::{AuthUser, JsonBody};

/// Use cases shared by every handler.
#[derive(Clone)]
pub struct ApiState {
    pub users: UserService,
    pub pairing: PairingService,
    pub devices: DeviceRegistry,
    pub notifications: NotificationPipeline,
}

/// Builds the complete `/api` router.
pub fn router(state: ApiState) -> Router {
    Router::new()
        // Accounts and pairing
        .route("/api/auth/register", post(auth::register))
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/profile", get(auth::profile))
        .route("/api/auth/generate-qrcode", post(auth::generate_qrcode))
        .route("/api/auth/verify-qrcode", post(auth::verify_qrcode))
        .route("/api/auth/disconnect", post(auth::disconnect))
        // Notifications
        .route(
            "/api/notifications",
            post(notifications::create).get(notifications::list),
        )
        .route("/api/notifications/stats", get(notifications::stats))
        .route("/api/notifications/read-all", put(notifications::mark_all_read))
        .route("/api/notifications/{id}/read", put(notifications::mark_read))
        .route(
            "/api/notifications/{id}",
            axum::routing::delete(notifications::delete),
        )
        // Users, devices, sessions
        .route(
            "/api/users/notification-settings",
            put(users::update_notification_settings),
        )
        .route("/api/users/devices", get(users::list_devices))
        .route(
            "/api/users/devices/{id}",
            put(users::rename_device).delete(users::delete_device),
        )
        .route("/api/users/sessions", get(users::list_sessions))
        .route("/api/users/profile", put(users::update_profile))
        .route("/api/users/change-password", put(users::change_password))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_headers(Any)
                .allow_methods(Any),
        )
        .with_state(state)
}

/// Binds `bind_addr` and serves the REST API until `shutdown` resolves.
///
/// # Errors
///
/// Returns an error if the listener cannot be bound or the server fails.
pub async fn run_http<F>(bind_addr: &str, state: ApiState, shutdown: F) -> anyhow::Result<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("failed to bind HTTP listener on {bind_addr}"))?;
    info!("REST API listening on {bind_addr}");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .context("HTTP server failed")
}
