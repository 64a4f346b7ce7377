//! WebSocket server: accept loop and per-connection task management.
//!
//! This module is responsible for:
//!
//! 1. Binding a TCP listener on the configured address.
//! 2. Upgrading each accepted connection to a WebSocket.
//! 3. Waiting for the client's `authenticate` message and registering the
//!    connection in the [`ConnectionRegistry`] under that user.
//! 4. Forwarding every [`ServerEvent`] fanned out to the user as a JSON text
//!    frame.
//! 5. Relaying `device_status` reports to the user's *other* connections.
//! 6. Unregistering the connection when the socket closes.
//!
//! # Per-connection tasks
//!
//! ```text
//!            ┌──────────── reader (this task) ────────────┐
//! socket ──► │ authenticate / device_status / close       │
//!            └────────────────────────────────────────────┘
//!            ┌──────────── writer (spawned) ──────────────┐
//! mpsc rx ─► │ ServerEvent → JSON → socket                │ ──► socket
//!            └────────────────────────────────────────────┘
//! ```
//!
//! The registry only ever holds the `mpsc` sender, so fan-out never touches
//! the socket directly and one slow client never delays another.
//!
//! # Shutdown
//!
//! The accept loop polls a shared `AtomicBool` between 200 ms accept
//! timeouts, the same flag the Ctrl+C handler in `main.rs` clears.

use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::{
    accept_async,
    tungstenite::{Error as WsError, Message as WsMessage},
};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use relay_core::{ClientMessage, ServerEvent, UserId};

use crate::application::connection_registry::{ConnectionHandle, ConnectionId, ConnectionRegistry};
use crate::application::devices::DeviceRegistry;
use crate::infrastructure::storage::Store;

/// Everything a connection task needs, cheaply cloneable.
#[derive(Clone)]
pub struct RealtimeContext {
    pub connections: Arc<ConnectionRegistry>,
    pub devices: DeviceRegistry,
    pub store: Arc<dyn Store>,
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Binds `bind_addr` and runs the accept loop until `running` is cleared.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot be bound.
pub async fn run_server(
    bind_addr: &str,
    context: RealtimeContext,
    running: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("failed to bind WebSocket listener on {bind_addr}"))?;
    info!("real-time channel listening on {bind_addr}");
    serve(listener, context, running).await;
    Ok(())
}

/// Runs the accept loop on an already bound listener.
///
/// Split from [`run_server`] so tests can bind `127.0.0.1:0` and learn the
/// port before the loop starts.
pub async fn serve(listener: TcpListener, context: RealtimeContext, running: Arc<AtomicBool>) {
    loop {
        if !running.load(Ordering::Relaxed) {
            info!("shutdown flag set; stopping accept loop");
            break;
        }

        match timeout(Duration::from_millis(200), listener.accept()).await {
            Ok(Ok((stream, peer_addr))) => {
                debug!("new real-time connection from {peer_addr}");
                let ctx = context.clone();
                tokio::spawn(async move {
                    handle_connection(stream, peer_addr, ctx).await;
                });
            }
            Ok(Err(e)) => {
                // Transient accept error (e.g. too many open file descriptors).
                error!("accept error: {e}");
            }
            Err(_) => {
                // Timeout; loop back to check the `running` flag.
            }
        }
    }
}

// ── Per-connection handler ────────────────────────────────────────────────────

async fn handle_connection(stream: TcpStream, peer_addr: SocketAddr, context: RealtimeContext) {
    match run_connection(stream, peer_addr, context).await {
        Ok(()) => debug!("connection {peer_addr} closed normally"),
        Err(e) => warn!("connection {peer_addr} closed with error: {e:#}"),
    }
}

/// Per-connection state held by the reader loop.
struct Session {
    id: ConnectionId,
    peer: SocketAddr,
    sender: mpsc::UnboundedSender<ServerEvent>,
    user: Option<UserId>,
}

async fn run_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    context: RealtimeContext,
) -> anyhow::Result<()> {
    let ws_stream = accept_async(stream)
        .await
        .with_context(|| format!("WebSocket handshake failed with {peer_addr}"))?;
    let (mut ws_tx, mut ws_rx) = ws_stream.split();

    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();
    let mut session = Session {
        id: Uuid::new_v4(),
        peer: peer_addr,
        sender: tx,
        user: None,
    };

    // ── Writer: registry → socket ─────────────────────────────────────────────
    let writer_peer = peer_addr;
    let writer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let text = match event.to_json() {
                Ok(text) => text,
                Err(e) => {
                    error!("connection {writer_peer}: failed to encode {}: {e}", event.name());
                    continue;
                }
            };
            if ws_tx.send(WsMessage::Text(text)).await.is_err() {
                debug!("connection {writer_peer}: send failed (client disconnected)");
                break;
            }
        }
        let _ = ws_tx.close().await;
    });

    // ── Reader: socket → use cases ────────────────────────────────────────────
    loop {
        let frame = match ws_rx.next().await {
            Some(Ok(frame)) => frame,
            Some(Err(WsError::ConnectionClosed | WsError::Protocol(_))) | None => {
                debug!("connection {peer_addr}: stream ended");
                break;
            }
            Some(Err(e)) => {
                warn!("connection {peer_addr}: WebSocket error: {e}");
                break;
            }
        };

        match frame {
            WsMessage::Text(text) => match ClientMessage::from_json(&text) {
                Ok(message) => {
                    debug!("connection {peer_addr}: client → relay: {}", message.name());
                    handle_client_message(&mut session, message, &context).await;
                }
                Err(e) => {
                    // One bad frame does not end the connection.
                    warn!("connection {peer_addr}: invalid client message: {e}");
                }
            },
            WsMessage::Close(_) => break,
            // Pings are answered by tungstenite; binary frames are not part
            // of the protocol.
            _ => {}
        }
    }

    if let Some(user) = session.user {
        context.connections.unregister(user, session.id);
        info!(user = %user, "real-time connection {peer_addr} closed");
    }
    drop(session);
    writer.abort();
    Ok(())
}

async fn handle_client_message(
    session: &mut Session,
    message: ClientMessage,
    context: &RealtimeContext,
) {
    match message {
        ClientMessage::Authenticate { user_id, device_id } => {
            let ack = match authenticate(session, &user_id, &device_id, context).await {
                Ok(user) => {
                    info!(user = %user, device = %device_id, "connection {} authenticated", session.peer);
                    ServerEvent::Authenticated {
                        success: true,
                        message: None,
                    }
                }
                Err(reason) => {
                    warn!("connection {}: authentication rejected: {reason}", session.peer);
                    ServerEvent::Authenticated {
                        success: false,
                        message: Some(reason.to_string()),
                    }
                }
            };
            let _ = session.sender.send(ack);
        }
        ClientMessage::DeviceStatus { device_id, status } => match session.user {
            Some(user) => {
                let event = ServerEvent::DeviceStatusUpdate { device_id, status };
                context.connections.fan_out_except(user, session.id, &event);
            }
            None => {
                debug!("connection {}: device_status before authenticate ignored", session.peer);
            }
        },
    }
}

async fn authenticate(
    session: &mut Session,
    user_id: &str,
    device_id: &str,
    context: &RealtimeContext,
) -> Result<UserId, &'static str> {
    let user = Uuid::parse_str(user_id).map_err(|_| "Invalid user id")?;
    match context.store.user(user).await {
        Ok(Some(_)) => {}
        Ok(None) => return Err("Unknown user"),
        Err(e) => {
            error!("authentication lookup failed: {e}");
            return Err("Server Error");
        }
    }

    // A connection re-authenticating as someone else leaves its old user.
    if let Some(previous) = session.user {
        if previous != user {
            context.connections.unregister(previous, session.id);
        }
    }

    let device = (!device_id.is_empty()).then(|| device_id.to_string());
    let handle = ConnectionHandle::new(session.id, device, session.sender.clone());
    context.connections.register(user, handle);
    session.user = Some(user);

    if !device_id.is_empty() {
        if let Err(e) = context.devices.touch(device_id).await {
            warn!("failed to record activity for device {device_id}: {e}");
        }
    }
    Ok(user)
}
