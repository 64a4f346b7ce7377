//! relay-server library crate.
//!
//! This crate provides the Notify-Relay server: QR pairing sessions between a
//! phone and a desktop, a device registry, and a notification pipeline that
//! pushes every accepted notification to all live connections of its user.
//!
//! # Architecture (clean architecture)
//!
//! ```text
//! Phone / desktop / web
//!     │ REST (axum)            │ WebSocket (tokio-tungstenite)
//!     ▼                        ▼
//! [relay-server]
//!   ├── application/     Use cases: pairing, devices, notifications,
//!   │                    users, connection registry, expiry sweeper
//!   └── infrastructure/
//!         ├── http_api/  REST routes and error mapping
//!         ├── ws_server  Real-time channel accept loop
//!         ├── storage/   Store trait + in-memory store
//!         ├── config     TOML configuration
//!         ├── auth       Argon2 + JWT
//!         └── qr         Pairing-code rendering
//! ```
//!
//! Domain types (entities, wire events, errors) live in `relay-core`.
//!
//! # Layer rules
//!
//! - `application` depends on `relay-core` and the [`infrastructure::storage::Store`]
//!   trait, never on a concrete store, socket or HTTP type.
//! - `infrastructure` depends on everything else plus the frameworks.
//!
//! [`RelayServices`] wires one instance of every use case around a shared
//! store, clock and connection registry.  `main.rs` and the integration
//! tests both start from it.

use std::sync::Arc;

use relay_core::Clock;

/// Application layer: use cases.
pub mod application;

/// Infrastructure layer: storage, configuration, transports.
pub mod infrastructure;

use application::connection_registry::ConnectionRegistry;
use application::devices::DeviceRegistry;
use application::notifications::{NotificationPipeline, PageLimits};
use application::pairing::PairingService;
use application::sweeper::ExpirySweeper;
use application::users::UserService;
use infrastructure::auth::TokenIssuer;
use infrastructure::config::ServerConfig;
use infrastructure::http_api::ApiState;
use infrastructure::storage::Store;
use infrastructure::ws_server::RealtimeContext;

/// Every use case of the relay, sharing one store, clock and registry.
#[derive(Clone)]
pub struct RelayServices {
    pub store: Arc<dyn Store>,
    pub clock: Arc<dyn Clock>,
    pub connections: Arc<ConnectionRegistry>,
    pub devices: DeviceRegistry,
    pub pairing: PairingService,
    pub notifications: NotificationPipeline,
    pub users: UserService,
}

impl RelayServices {
    /// Builds the services described by `config` on top of `store` and `clock`.
    pub fn new(config: &ServerConfig, store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
        let connections = Arc::new(ConnectionRegistry::new());
        let devices = DeviceRegistry::new(store.clone(), connections.clone(), clock.clone());
        let pairing = PairingService::new(
            store.clone(),
            devices.clone(),
            connections.clone(),
            clock.clone(),
            config.pairing.session_ttl(),
        );
        let notifications = NotificationPipeline::new(
            store.clone(),
            devices.clone(),
            connections.clone(),
            clock.clone(),
            PageLimits {
                default_size: config.notifications.default_page_size,
                max_size: config.notifications.max_page_size,
            },
        );
        let tokens = TokenIssuer::new(&config.auth.jwt_secret, config.auth.token_ttl());
        let users = UserService::new(store.clone(), tokens, clock.clone());

        Self {
            store,
            clock,
            connections,
            devices,
            pairing,
            notifications,
            users,
        }
    }

    /// State handed to the REST router.
    pub fn api_state(&self) -> ApiState {
        ApiState {
            users: self.users.clone(),
            pairing: self.pairing.clone(),
            devices: self.devices.clone(),
            notifications: self.notifications.clone(),
        }
    }

    /// State handed to the WebSocket accept loop.
    pub fn realtime_context(&self) -> RealtimeContext {
        RealtimeContext {
            connections: self.connections.clone(),
            devices: self.devices.clone(),
            store: self.store.clone(),
        }
    }

    /// The expiry sweeper, not yet started.
    pub fn sweeper(&self, config: &ServerConfig) -> ExpirySweeper {
        ExpirySweeper::new(self.pairing.clone(), config.pairing.sweep_interval())
    }
}
