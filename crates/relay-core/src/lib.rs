//! # relay-core
//!
//! Shared library for Notify-Relay containing the domain entities, the
//! delivery-preference filter, the error taxonomy, and the JSON events that
//! travel over the real-time channel.
//!
//! This crate is used by both the relay server and the relay client.
//! It has zero dependencies on sockets, storage engines, or an async runtime.
//!
//! # Architecture overview (for beginners)
//!
//! Notify-Relay pairs a phone with a desktop (or web) client by showing a QR
//! code on the phone and scanning it from the desktop.  Once paired, every
//! notification the phone reports (an email, a missed call, a chat message,
//! an app alert) is pushed to every live connection of the same user.
//!
//! This crate (`relay-core`) is the shared foundation.  It defines:
//!
//! - **`domain`** – Users, devices, pairing sessions, and notifications, plus
//!   the pure rules that govern them (which notifications a user's settings
//!   block, when a session counts as expired, how read/unread stats add up).
//!
//! - **`protocol`** – The JSON messages exchanged over the WebSocket channel.
//!   Every frame is `{"event": <name>, "data": <payload>}`.
//!
//! - **`error`** – `RelayError`, the single error type every use case returns.
//!
//! - **`clock`** – A tiny time abstraction so expiry logic can be tested
//!   without sleeping.

pub mod clock;
pub mod domain;
pub mod error;
pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `relay_core::PairingSession` instead of `relay_core::domain::session::PairingSession`.
pub use clock::{Clock, ManualClock, SystemClock};
pub use domain::device::{Device, DeviceDescriptor, DeviceKind};
pub use domain::notification::{
    NewNotification, Notification, NotificationId, NotificationPage, NotificationQuery,
    NotificationStats, NotificationType, TypeCounts,
};
pub use domain::session::{PairingSession, SessionState, TerminationCause};
pub use domain::user::{
    DeliveryDecision, NotificationPreferences, PreferencesPatch, User, UserId, UserProfile,
};
pub use error::{ErrorKind, RelayError};
pub use protocol::events::{
    ClientMessage, NotificationPayload, NotificationUpdate, ServerEvent, SessionUpdate,
};
