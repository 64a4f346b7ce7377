//! relay-client library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.
//!
//! # What does relay-client do? (for beginners)
//!
//! The *client* is a desktop or web device that has been paired with the
//! user's phone.  It holds one WebSocket connection to the relay and shows
//! the notifications the phone reports.
//!
//! The client:
//!
//! 1. Connects to the relay's real-time port and sends `authenticate` with
//!    the user id and its own device id.
//! 2. Receives `notification`, `notification_update`, `session_update` and
//!    `device_status_update` frames.
//! 3. Keeps the most recent notifications in a bounded history, ignoring
//!    duplicate deliveries.
//! 4. Calls any handlers subscribed to the event.
//! 5. Reconnects with a capped backoff when the connection drops.

/// Application layer: notification history and event subscriptions.
pub mod application;

/// Infrastructure layer: the WebSocket connection.
pub mod infrastructure;

pub use application::history::{CachedNotification, NotificationHistory};
pub use application::subscriptions::{EventSubscriptions, SubscriptionId, ANY_EVENT};
pub use infrastructure::connection::{
    ClientConfig, ClientError, ConnectionEvent, ConnectionState, RelayClient,
};
