//! Reconnecting WebSocket connection to the relay.
//!
//! Architecture:
//! - [`RelayClient`] owns the configuration, the notification history, and
//!   the event subscriptions.
//! - [`RelayClient::start`] spawns the reconnect loop and returns a channel of
//!   [`ConnectionEvent`]s for the caller's dispatch loop.
//! - Each connection sends `authenticate` first, then feeds every decoded
//!   frame into the history, the subscriptions and the event channel, in
//!   that order.
//! - Outbound messages (`device_status`) go through a per-connection queue
//!   that only exists while the socket is up.
//!
//! # Reconnecting (for beginners)
//!
//! When a connection attempt fails, the client waits before trying again.
//! The wait doubles after each consecutive failure (1 s, 2 s, 4 s) and is
//! capped (5 s by default).  After `reconnect_attempts` consecutive failures
//! the loop gives up with [`ClientError::ReconnectExhausted`].  A connection
//! that came up and later dropped resets the failure count.
//!
//! An `authenticated` frame with `success: false` stops the loop for good:
//! retrying with the same user id would be rejected again.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex, MutexGuard, PoisonError,
};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use relay_core::{ClientMessage, ServerEvent};
use thiserror::Error;
use tokio::{net::TcpStream, sync::mpsc, time};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{Error as WsError, Message as WsMessage},
    MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, error, info, warn};

use crate::application::history::{
    CachedNotification, NotificationHistory, DEFAULT_HISTORY_SIZE,
};
use crate::application::subscriptions::{EventSubscriptions, SubscriptionId};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// How often an open connection checks the shutdown flag.
const RUNNING_POLL: Duration = Duration::from_millis(200);

/// Errors that can occur in the client connection.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Too many consecutive connection attempts failed.
    #[error("gave up on {url} after {attempts} failed attempts: {source}")]
    ReconnectExhausted {
        url: String,
        attempts: u32,
        #[source]
        source: WsError,
    },
    /// The relay refused the `authenticate` message.
    #[error("relay rejected authentication: {0}")]
    Rejected(String),
    /// An outbound message could not be encoded.
    #[error("could not encode message: {0}")]
    Encode(#[from] serde_json::Error),
    /// There is no open connection to send on.
    #[error("not connected to the relay")]
    NotConnected,
}

/// Configuration for the relay connection.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// WebSocket URL of the relay, e.g. `ws://127.0.0.1:5001`.
    pub server_url: String,
    /// User id sent in `authenticate`.
    pub user_id: String,
    /// This device's id, sent in `authenticate` and `device_status`.
    pub device_id: String,
    /// Capacity of the notification history.
    pub history_size: usize,
    /// Consecutive failed connection attempts tolerated before giving up.
    pub reconnect_attempts: u32,
    /// Delay after the first failure.
    pub initial_backoff: Duration,
    /// Upper bound on the delay between attempts.
    pub max_backoff: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: "ws://127.0.0.1:5001".to_string(),
            user_id: String::new(),
            device_id: "relay-client".to_string(),
            history_size: DEFAULT_HISTORY_SIZE,
            reconnect_attempts: 5,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(5),
        }
    }
}

/// Connection lifecycle as seen by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// The relay acknowledged `authenticate`.
    Authenticated,
}

/// Events emitted by the connection to the application.
#[derive(Debug)]
pub enum ConnectionEvent {
    /// The WebSocket handshake completed.
    Connected { url: String },
    /// A frame from the relay, after history and subscriptions saw it.
    Event(ServerEvent),
    /// The connection was lost or closed.
    Disconnected,
    /// The reconnect loop ended.  `None` means a clean shutdown.
    Stopped(Option<ClientError>),
}

/// Delay before the next attempt after `failures` consecutive failures.
///
/// Doubles from `initial` and never exceeds `max`.
pub fn backoff_delay(failures: u32, initial: Duration, max: Duration) -> Duration {
    let exponent = failures.saturating_sub(1).min(31);
    initial.saturating_mul(1u32 << exponent).min(max)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Client side of the real-time channel.
pub struct RelayClient {
    config: ClientConfig,
    state: Mutex<ConnectionState>,
    history: Mutex<NotificationHistory>,
    subscriptions: Mutex<EventSubscriptions>,
    outbound: Mutex<Option<mpsc::UnboundedSender<ClientMessage>>>,
}

impl RelayClient {
    /// Creates a new (not yet connected) client.
    pub fn new(config: ClientConfig) -> Self {
        let history = NotificationHistory::new(config.history_size);
        Self {
            config,
            state: Mutex::new(ConnectionState::Disconnected),
            history: Mutex::new(history),
            subscriptions: Mutex::new(EventSubscriptions::new()),
            outbound: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn state(&self) -> ConnectionState {
        *lock(&self.state)
    }

    fn set_state(&self, state: ConnectionState) {
        *lock(&self.state) = state;
    }

    /// Registers a handler for an event name (or `"*"`).
    pub fn on<F>(&self, event: impl Into<String>, handler: F) -> SubscriptionId
    where
        F: Fn(&ServerEvent) + Send + Sync + 'static,
    {
        lock(&self.subscriptions).on(event, handler)
    }

    pub fn off(&self, id: SubscriptionId) -> bool {
        lock(&self.subscriptions).off(id)
    }

    /// Cached notifications, newest first.
    pub fn history(&self) -> Vec<CachedNotification> {
        lock(&self.history).iter().cloned().collect()
    }

    pub fn unread_count(&self) -> usize {
        lock(&self.history).unread_count()
    }

    /// Reports this device's status to the user's other connections.
    pub fn send_device_status(&self, status: impl Into<String>) -> Result<(), ClientError> {
        let message = ClientMessage::DeviceStatus {
            device_id: self.config.device_id.clone(),
            status: status.into(),
        };
        let guard = lock(&self.outbound);
        let sender = guard.as_ref().ok_or(ClientError::NotConnected)?;
        sender.send(message).map_err(|_| ClientError::NotConnected)
    }

    /// Spawns the reconnect loop and returns its event channel.
    ///
    /// Runs until `running` is set to false, authentication is rejected, or
    /// the attempt budget is spent.  The last event is always
    /// [`ConnectionEvent::Stopped`].
    pub async fn start(
        self: Arc<Self>,
        running: Arc<AtomicBool>,
    ) -> mpsc::Receiver<ConnectionEvent> {
        let (tx, rx) = mpsc::channel(128);

        tokio::spawn(async move {
            let outcome = self.run(&running, &tx).await;
            if let Err(e) = &outcome {
                error!("relay client stopped: {e}");
            }
            let _ = tx.send(ConnectionEvent::Stopped(outcome.err())).await;
        });

        rx
    }

    async fn run(
        &self,
        running: &AtomicBool,
        tx: &mpsc::Sender<ConnectionEvent>,
    ) -> Result<(), ClientError> {
        let url = self.config.server_url.clone();
        let max_failures = self.config.reconnect_attempts.max(1);
        let mut failures: u32 = 0;

        while running.load(Ordering::Relaxed) {
            self.set_state(ConnectionState::Connecting);
            match connect_async(url.as_str()).await {
                Ok((stream, _)) => {
                    failures = 0;
                    info!("connected to relay at {url}");
                    self.set_state(ConnectionState::Connected);
                    let _ = tx.send(ConnectionEvent::Connected { url: url.clone() }).await;

                    let outcome = self.session(stream, running, tx).await;

                    *lock(&self.outbound) = None;
                    self.set_state(ConnectionState::Disconnected);
                    let _ = tx.send(ConnectionEvent::Disconnected).await;
                    outcome?;
                }
                Err(e) => {
                    failures += 1;
                    self.set_state(ConnectionState::Disconnected);
                    warn!(attempt = failures, "could not connect to relay at {url}: {e}");
                    if failures >= max_failures {
                        return Err(ClientError::ReconnectExhausted {
                            url,
                            attempts: failures,
                            source: e,
                        });
                    }
                }
            }

            if running.load(Ordering::Relaxed) {
                let delay = backoff_delay(
                    failures.max(1),
                    self.config.initial_backoff,
                    self.config.max_backoff,
                );
                info!("reconnecting in {delay:?}");
                time::sleep(delay).await;
            }
        }

        Ok(())
    }

    /// Drives one open connection until it closes.
    ///
    /// Returns `Err` only for failures that must not be retried.
    async fn session(
        &self,
        stream: WsStream,
        running: &AtomicBool,
        tx: &mpsc::Sender<ConnectionEvent>,
    ) -> Result<(), ClientError> {
        let (mut sink, mut source) = stream.split();

        let hello = ClientMessage::Authenticate {
            user_id: self.config.user_id.clone(),
            device_id: self.config.device_id.clone(),
        }
        .to_json()?;
        if let Err(e) = sink.send(WsMessage::Text(hello)).await {
            warn!("could not send authenticate: {e}");
            return Ok(());
        }

        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<ClientMessage>();
        *lock(&self.outbound) = Some(out_tx);

        let mut tick = time::interval(RUNNING_POLL);
        loop {
            tokio::select! {
                frame = source.next() => match frame {
                    Some(Ok(WsMessage::Text(text))) => match ServerEvent::from_json(&text) {
                        Ok(event) => self.dispatch(event, tx).await?,
                        Err(e) => warn!("ignoring undecodable frame: {e}"),
                    },
                    Some(Ok(WsMessage::Close(_))) | None => {
                        info!("relay closed the connection");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!("websocket error: {e}");
                        break;
                    }
                },
                Some(message) = out_rx.recv() => {
                    let text = message.to_json()?;
                    debug!(event = message.name(), "sending frame");
                    if let Err(e) = sink.send(WsMessage::Text(text)).await {
                        warn!("send failed: {e}");
                        break;
                    }
                }
                _ = tick.tick() => {
                    if !running.load(Ordering::Relaxed) {
                        let _ = sink.close().await;
                        break;
                    }
                }
            }
        }

        Ok(())
    }

    /// Feeds one decoded frame to the history, the subscriptions and the
    /// event channel.
    async fn dispatch(
        &self,
        event: ServerEvent,
        tx: &mpsc::Sender<ConnectionEvent>,
    ) -> Result<(), ClientError> {
        debug!(event = event.name(), "frame received");

        lock(&self.history).apply(&event);
        let handlers = lock(&self.subscriptions).matching(event.name());
        for handler in &handlers {
            handler(&event);
        }

        let rejected = match &event {
            ServerEvent::Authenticated { success: true, .. } => {
                info!(device_id = %self.config.device_id, "authenticated with relay");
                self.set_state(ConnectionState::Authenticated);
                None
            }
            ServerEvent::Authenticated {
                success: false,
                message,
            } => Some(
                message
                    .clone()
                    .unwrap_or_else(|| "authentication failed".to_string()),
            ),
            _ => None,
        };

        let _ = tx.send(ConnectionEvent::Event(event)).await;
        match rejected {
            Some(reason) => Err(ClientError::Rejected(reason)),
            None => Ok(()),
        }
    }
}
