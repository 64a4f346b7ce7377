//! Notify-Relay server: entry point.
//!
//! This binary runs three things side by side on one Tokio runtime:
//!
//! - the REST API (axum) that phones and desktops use to register, pair and
//!   submit notifications,
//! - the real-time WebSocket channel that pushes events to live clients,
//! - the expiry sweeper that terminates pairing sessions past their deadline.
//!
//! # Usage
//!
//! ```text
//! relay-server [OPTIONS]
//!
//! Options:
//!   --config      <PATH>    TOML configuration file [default: platform config dir]
//!   --http-port   <PORT>    REST API port [default: 5000]
//!   --ws-port     <PORT>    WebSocket port [default: 5001]
//!   --bind        <IP>      Address both listeners bind to [default: 0.0.0.0]
//!   --jwt-secret  <SECRET>  HMAC secret for bearer tokens
//!   --init-config           Write the effective configuration and exit
//! ```
//!
//! # Environment variable overrides
//!
//! CLI args take precedence over environment variables, which take
//! precedence over the configuration file.
//!
//! | Variable           | Description               |
//! |--------------------|---------------------------|
//! | `RELAY_CONFIG`     | Configuration file path   |
//! | `RELAY_HTTP_PORT`  | REST API port             |
//! | `RELAY_WS_PORT`    | WebSocket port            |
//! | `RELAY_BIND`       | Bind address              |
//! | `RELAY_JWT_SECRET` | Bearer token secret       |
//! | `RUST_LOG`         | Log filter (`tracing`)    |

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use relay_core::SystemClock;
use relay_server::infrastructure::config::{
    config_file_path, load_config_from, save_config_to, ServerConfig,
};
use relay_server::infrastructure::storage::MemoryStore;
use relay_server::infrastructure::{run_http, run_server};
use relay_server::RelayServices;

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Notify-Relay server.
///
/// Pairs phones with desktops via QR codes and relays the phone's
/// notifications to every live connection of the same user.
#[derive(Debug, Parser)]
#[command(
    name = "relay-server",
    about = "QR pairing and real-time notification relay",
    version
)]
struct Cli {
    /// Path of the TOML configuration file.
    ///
    /// A missing file is not an error; built-in defaults are used.
    #[arg(long, env = "RELAY_CONFIG")]
    config: Option<PathBuf>,

    /// TCP port for the REST API.
    #[arg(long, env = "RELAY_HTTP_PORT")]
    http_port: Option<u16>,

    /// TCP port for the real-time WebSocket channel.
    #[arg(long, env = "RELAY_WS_PORT")]
    ws_port: Option<u16>,

    /// IP address both listeners bind to.
    ///
    /// Use `0.0.0.0` to accept connections from any interface, or
    /// `127.0.0.1` to accept only local connections.
    #[arg(long, env = "RELAY_BIND")]
    bind: Option<String>,

    /// HMAC secret used to sign bearer tokens.
    #[arg(long, env = "RELAY_JWT_SECRET", hide_env_values = true)]
    jwt_secret: Option<String>,

    /// Write the effective configuration to the config path and exit.
    #[arg(long)]
    init_config: bool,
}

impl Cli {
    /// Applies the CLI overrides on top of `base` and validates the result.
    ///
    /// # Errors
    ///
    /// Returns an error if `--bind` is not an IP address, if a configured bind
    /// address is not `ip:port`, or if the merged configuration is invalid.
    fn into_server_config(self, mut base: ServerConfig) -> anyhow::Result<ServerConfig> {
        let bind_ip: Option<IpAddr> = match &self.bind {
            Some(raw) => Some(
                raw.parse()
                    .with_context(|| format!("invalid bind address: '{raw}'"))?,
            ),
            None => None,
        };

        base.server.http_bind = override_addr(&base.server.http_bind, bind_ip, self.http_port)
            .context("invalid server.http_bind")?;
        base.server.ws_bind = override_addr(&base.server.ws_bind, bind_ip, self.ws_port)
            .context("invalid server.ws_bind")?;

        if let Some(secret) = self.jwt_secret {
            base.auth.jwt_secret = secret;
        }

        base.validate()?;
        Ok(base)
    }
}

/// Replaces the IP and/or port of an `ip:port` string.
fn override_addr(current: &str, ip: Option<IpAddr>, port: Option<u16>) -> anyhow::Result<String> {
    let mut addr: SocketAddr = current
        .parse()
        .with_context(|| format!("'{current}' is not an ip:port address"))?;
    if let Some(ip) = ip {
        addr.set_ip(ip);
    }
    if let Some(port) = port {
        addr.set_port(port);
    }
    Ok(addr.to_string())
}

// ── Entry point ───────────────────────────────────────────────────────────────

/// Program entry point.
///
/// # What happens at startup
///
/// 1. CLI arguments are parsed and the configuration file is loaded.
/// 2. `tracing_subscriber` is initialised; `RUST_LOG` wins over the
///    configured `log_level`.
/// 3. The use cases are wired around an in-memory store.
/// 4. A Ctrl+C handler clears a shared `AtomicBool`.
/// 5. The sweeper, the WebSocket accept loop and the REST API run until that
///    flag is cleared.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = match &cli.config {
        Some(path) => path.clone(),
        None => config_file_path()?,
    };
    let file_config = load_config_from(&config_path)
        .with_context(|| format!("failed to load {}", config_path.display()))?;
    let init_config = cli.init_config;
    let config = cli.into_server_config(file_config)?;

    if init_config {
        save_config_to(&config, &config_path)?;
        println!("wrote {}", config_path.display());
        return Ok(());
    }

    // ── Logging setup ─────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.server.log_level)),
        )
        .init();

    info!(
        "Notify-Relay starting: http={}, ws={}, session_ttl={}s",
        config.server.http_bind, config.server.ws_bind, config.pairing.session_ttl_secs
    );

    let services = RelayServices::new(&config, Arc::new(MemoryStore::new()), Arc::new(SystemClock));

    // ── Graceful shutdown flag ─────────────────────────────────────────────────
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C; initiating graceful shutdown");
                running_clone.store(false, Ordering::Relaxed);
            }
            Err(e) => {
                tracing::error!("failed to listen for Ctrl+C signal: {e}");
            }
        }
    });

    // ── Background tasks ───────────────────────────────────────────────────────
    let sweeper = services.sweeper(&config).start(Arc::clone(&running));

    let ws_bind = config.server.ws_bind.clone();
    let ws_context = services.realtime_context();
    let ws_running = Arc::clone(&running);
    let ws_task = tokio::spawn(async move { run_server(&ws_bind, ws_context, ws_running).await });

    // ── REST API (runs on this task) ───────────────────────────────────────────
    let http_running = Arc::clone(&running);
    let shutdown = async move {
        while http_running.load(Ordering::Relaxed) {
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
    };
    let http_result = run_http(&config.server.http_bind, services.api_state(), shutdown).await;

    // Whatever ended the HTTP server, stop the other tasks too.
    running.store(false, Ordering::Relaxed);
    let ws_result = ws_task.await.context("WebSocket task panicked")?;
    sweeper.abort();

    http_result?;
    ws_result?;
    info!("Notify-Relay stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
