//! JSON events for the real-time channel.
//!
//! # Message flow
//!
//! ```text
//! Client → Relay:  JSON text frame  →  ClientMessage
//! Relay  → Client: ServerEvent      →  JSON text frame
//! ```
//!
//! # JSON shape
//!
//! Every frame names its event and carries the payload under `"data"`:
//!
//! ```json
//! {"event":"authenticate","data":{"userId":"…","deviceId":"m-1"}}
//! {"event":"session_update","data":{"type":"connection_established","sessionId":"…","connectedDevices":["m-1","d-1"]}}
//! {"event":"notification_update","data":{"type":"notification_read","notificationId":"…"}}
//! ```
//!
//! Serde's adjacently tagged representation (`tag = "event", content = "data"`)
//! produces this automatically.  The two update payloads are themselves
//! internally tagged by `"type"`.
//!
//! Two distinct enums are used for the two directions so that the compiler
//! rejects sending a server-only event upstream and vice versa.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::notification::{Notification, NotificationId, NotificationType};

// ── Client → Relay messages ───────────────────────────────────────────────────

/// All messages a client can send to the relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
pub enum ClientMessage {
    /// Binds this connection to a user.  Nothing is fanned out to a
    /// connection until it has authenticated.
    Authenticate { user_id: String, device_id: String },

    /// Reports the sending device's status; relayed to the user's other
    /// connections as [`ServerEvent::DeviceStatusUpdate`].
    DeviceStatus { device_id: String, status: String },
}

impl ClientMessage {
    /// Parses one text frame.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Returns the wire name of this message, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Authenticate { .. } => "authenticate",
            Self::DeviceStatus { .. } => "device_status",
        }
    }
}

// ── Relay → Client events ─────────────────────────────────────────────────────

/// The notification fields pushed to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPayload {
    pub id: NotificationId,
    pub title: String,
    pub content: String,
    #[serde(rename = "type")]
    pub kind: NotificationType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_app: Option<String>,
    pub source_device_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

impl From<&Notification> for NotificationPayload {
    fn from(n: &Notification) -> Self {
        Self {
            id: n.id,
            title: n.title.clone(),
            content: n.content.clone(),
            kind: n.kind,
            source_app: n.source_app.clone(),
            source_device_id: n.source_device_id.clone(),
            timestamp: n.timestamp,
            action_url: n.action_url.clone(),
            icon: n.icon.clone(),
        }
    }
}

/// Payload of a `session_update` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum SessionUpdate {
    /// A counterpart verified the pairing token.
    ConnectionEstablished {
        session_id: String,
        /// Phone first, counterpart second.
        connected_devices: Vec<String>,
    },
    /// The session ended (disconnect, expiry, or device removal).
    ConnectionTerminated { session_id: String },
}

/// Payload of a `notification_update` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum NotificationUpdate {
    NotificationRead { notification_id: NotificationId },
    /// `notification_type` is a type name or `"all"`.
    AllNotificationsRead { notification_type: String },
    NotificationDeleted { notification_id: NotificationId },
}

/// All events the relay can push to a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
pub enum ServerEvent {
    /// A new notification passed the delivery filter.
    Notification { notification: NotificationPayload },
    SessionUpdate(SessionUpdate),
    NotificationUpdate(NotificationUpdate),
    /// Acknowledges an `authenticate` message.
    Authenticated {
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    /// Another connection of the same user reported its status.
    DeviceStatusUpdate { device_id: String, status: String },
}

impl ServerEvent {
    /// Parses one text frame.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Returns the wire event name (`"notification"`, `"session_update"`, …).
    ///
    /// Used by client-side subscriptions and for log lines.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Notification { .. } => "notification",
            Self::SessionUpdate(_) => "session_update",
            Self::NotificationUpdate(_) => "notification_update",
            Self::Authenticated { .. } => "authenticated",
            Self::DeviceStatusUpdate { .. } => "device_status_update",
        }
    }

    pub fn notification(n: &Notification) -> Self {
        Self::Notification {
            notification: NotificationPayload::from(n),
        }
    }
}
