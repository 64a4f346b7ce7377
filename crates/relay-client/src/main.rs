//! Notify-Relay client: entry point.
//!
//! Connects to the relay's real-time channel as one paired device and logs
//! every notification the user's phone reports.
//!
//! # Architecture
//!
//! ```text
//! main()
//!  └─ RelayClient::new()        -- history + subscriptions
//!  └─ RelayClient::start()      -- WebSocket reconnect loop
//!  └─ event dispatch loop
//!       ├─ Connected / Disconnected  -> log status
//!       ├─ Event(notification)       -> already in history; log it
//!       └─ Stopped                   -> exit
//! ```
//!
//! # Usage
//!
//! ```text
//! relay-client --user-id <UUID> [OPTIONS]
//!
//! Options:
//!   --server              <URL>  Relay WebSocket URL [default: ws://127.0.0.1:5001]
//!   --user-id             <UUID> User to authenticate as
//!   --device-id           <ID>   This device's id [default: relay-client]
//!   --history-size        <N>    Notifications kept in memory [default: 100]
//!   --reconnect-attempts  <N>    Consecutive failures before giving up [default: 5]
//! ```
//!
//! Each option can also be set through `RELAY_SERVER_URL`, `RELAY_USER_ID`,
//! `RELAY_DEVICE_ID`, `RELAY_HISTORY_SIZE` and `RELAY_RECONNECT_ATTEMPTS`.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use anyhow::Context;
use clap::Parser;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use relay_client::{ClientConfig, ConnectionEvent, RelayClient};
use relay_core::{ServerEvent, SessionUpdate};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Notify-Relay client.
#[derive(Debug, Parser)]
#[command(
    name = "relay-client",
    about = "Receive relayed phone notifications over the real-time channel",
    version
)]
struct Cli {
    /// WebSocket URL of the relay.
    #[arg(long, env = "RELAY_SERVER_URL", default_value = "ws://127.0.0.1:5001")]
    server: String,

    /// User id to authenticate as.
    #[arg(long, env = "RELAY_USER_ID")]
    user_id: String,

    /// Device id this client reports itself as.
    #[arg(long, env = "RELAY_DEVICE_ID", default_value = "relay-client")]
    device_id: String,

    /// Number of notifications kept in memory.
    #[arg(long, env = "RELAY_HISTORY_SIZE", default_value_t = 100)]
    history_size: usize,

    /// Consecutive failed connection attempts before giving up.
    #[arg(long, env = "RELAY_RECONNECT_ATTEMPTS", default_value_t = 5)]
    reconnect_attempts: u32,
}

impl Cli {
    /// Builds the connection configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the user id is not a UUID, the URL is not a
    /// `ws://` or `wss://` URL, or the device id is empty.
    fn into_client_config(self) -> anyhow::Result<ClientConfig> {
        Uuid::parse_str(&self.user_id)
            .with_context(|| format!("invalid user id: '{}'", self.user_id))?;
        if !(self.server.starts_with("ws://") || self.server.starts_with("wss://")) {
            anyhow::bail!("server URL must start with ws:// or wss://: '{}'", self.server);
        }
        if self.device_id.trim().is_empty() {
            anyhow::bail!("device id must not be empty");
        }

        Ok(ClientConfig {
            server_url: self.server,
            user_id: self.user_id,
            device_id: self.device_id,
            history_size: self.history_size,
            reconnect_attempts: self.reconnect_attempts,
            ..Default::default()
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Cli::parse().into_client_config()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!(device_id = %config.device_id, "Notify-Relay client starting");

    let running = Arc::new(AtomicBool::new(true));
    let client = Arc::new(RelayClient::new(config));

    client.on("session_update", |event| {
        if let ServerEvent::SessionUpdate(update) = event {
            match update {
                SessionUpdate::ConnectionEstablished {
                    session_id,
                    connected_devices,
                } => info!("paired in session {session_id}: {connected_devices:?}"),
                SessionUpdate::ConnectionTerminated { session_id } => {
                    info!("session {session_id} ended")
                }
            }
        }
    });
    client.on("device_status_update", |event| {
        if let ServerEvent::DeviceStatusUpdate { device_id, status } = event {
            info!("device {device_id} is {status}");
        }
    });

    let mut events = Arc::clone(&client).start(Arc::clone(&running)).await;

    // ── Ctrl-C handler ────────────────────────────────────────────────────────
    let running_clone = Arc::clone(&running);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            running_clone.store(false, Ordering::Relaxed);
        }
    });

    // ── Event dispatch loop ───────────────────────────────────────────────────
    while let Some(event) = events.recv().await {
        match event {
            ConnectionEvent::Connected { url } => info!("connected to {url}"),
            ConnectionEvent::Disconnected => {
                warn!("disconnected from relay; reconnect in progress")
            }
            ConnectionEvent::Event(ServerEvent::Notification { notification }) => {
                info!(
                    kind = %notification.kind,
                    source = %notification.source_device_id,
                    unread = client.unread_count(),
                    "{}: {}",
                    notification.title,
                    notification.content
                );
            }
            ConnectionEvent::Event(other) => debug!(event = other.name(), "event"),
            ConnectionEvent::Stopped(None) => break,
            ConnectionEvent::Stopped(Some(e)) => {
                error!("{e}");
                return Err(e.into());
            }
        }
    }

    info!("Notify-Relay client stopped");
    Ok(())
}
