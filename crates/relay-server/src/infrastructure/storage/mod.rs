//! Persistence seam.
//!
//! The use cases in `application/` never talk to a storage engine directly;
//! they hold an `Arc<dyn Store>`.  Production and tests both use the
//! in-process [`MemoryStore`]; a database-backed store only has to implement
//! this trait.
//!
//! # Conditional updates
//!
//! Pairing-session transitions race with each other (two desktops scanning
//! the same code) and with the expiry sweeper.  To keep those races safe,
//! every state change is expressed as an atomic "update where state is X"
//! operation that reports whether *this* call performed the transition.  A
//! use case must never read a session, decide, and then write it back.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use relay_core::{
    Device, Notification, NotificationId, NotificationQuery, PairingSession, RelayError,
    TerminationCause, User, UserId,
};

pub use memory::MemoryStore;

/// Storage operations used by the relay's use cases.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Store: Send + Sync {
    // ── Users ─────────────────────────────────────────────────────────────

    /// Inserts a new user.  Fails with [`RelayError::EmailInUse`] if the
    /// email already belongs to an account.
    async fn insert_user(&self, user: User) -> Result<(), RelayError>;

    async fn user(&self, id: UserId) -> Result<Option<User>, RelayError>;

    async fn user_by_email(&self, email: &str) -> Result<Option<User>, RelayError>;

    /// Replaces a stored user.  Fails with [`RelayError::EmailInUse`] if the
    /// (possibly changed) email belongs to another account, and with
    /// [`RelayError::NotFound`] if the user does not exist.
    async fn update_user(&self, user: User) -> Result<(), RelayError>;

    // ── Devices ───────────────────────────────────────────────────────────

    async fn device(&self, device_id: &str) -> Result<Option<Device>, RelayError>;

    /// Inserts `device` unless its identifier is already taken, atomically.
    /// Returns the stored record (the existing one if there was one).
    async fn insert_device_if_absent(&self, device: Device) -> Result<Device, RelayError>;

    /// Sets the connected flag and bumps `last_active`.  Returns the updated
    /// device, or `None` if it does not exist.
    async fn set_device_connected(
        &self,
        device_id: &str,
        connected: bool,
        at: DateTime<Utc>,
    ) -> Result<Option<Device>, RelayError>;

    /// Bumps `last_active` without touching the connected flag.
    async fn touch_device(&self, device_id: &str, at: DateTime<Utc>) -> Result<(), RelayError>;

    /// Renames a device.  Returns `None` if it does not exist.
    async fn rename_device(
        &self,
        device_id: &str,
        name: String,
    ) -> Result<Option<Device>, RelayError>;

    /// Deletes a device.  Returns `true` if it existed.
    async fn delete_device(&self, device_id: &str) -> Result<bool, RelayError>;

    async fn devices_for_user(&self, user_id: UserId) -> Result<Vec<Device>, RelayError>;

    // ── Pairing sessions ──────────────────────────────────────────────────

    /// Inserts a session.  Fails if the token is already used.
    async fn insert_session(&self, session: PairingSession) -> Result<(), RelayError>;

    /// Inserts a new `Pending` session and, in the same critical section,
    /// terminates every `Pending` session of the same phone as
    /// [`TerminationCause::Superseded`].  Returns the superseded sessions.
    /// Fails without changing anything if the token is already used.
    async fn replace_pending_session(
        &self,
        session: PairingSession,
    ) -> Result<Vec<PairingSession>, RelayError>;

    async fn session(&self, token: &str) -> Result<Option<PairingSession>, RelayError>;

    /// `Pending → Active`, atomically.  Returns the activated session, or
    /// `None` if the session is missing or not `Pending`.
    async fn activate_session(
        &self,
        token: &str,
        counterpart_device_id: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<PairingSession>, RelayError>;

    /// `Pending | Active → Terminated`, atomically, recording `cause`.
    /// Returns the terminated session, or `None` if it was missing or
    /// already terminated.
    async fn terminate_session(
        &self,
        token: &str,
        cause: TerminationCause,
        at: DateTime<Utc>,
    ) -> Result<Option<PairingSession>, RelayError>;

    /// Live sessions whose deadline is strictly before `now`.
    async fn sessions_expired_before(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<PairingSession>, RelayError>;

    /// Live sessions in which `device_id` is either end.
    async fn live_sessions_for_device(
        &self,
        device_id: &str,
    ) -> Result<Vec<PairingSession>, RelayError>;

    /// Live sessions owned by `user_id`.
    async fn live_sessions_for_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<PairingSession>, RelayError>;

    // ── Notifications ─────────────────────────────────────────────────────

    async fn insert_notification(&self, notification: Notification) -> Result<(), RelayError>;

    /// Returns one page (newest first) and the total number of matches.
    async fn query_notifications(
        &self,
        user_id: UserId,
        query: NotificationQuery,
    ) -> Result<(Vec<Notification>, usize), RelayError>;

    /// Every notification owned by `user_id`.
    async fn notifications_for_user(&self, user_id: UserId)
        -> Result<Vec<Notification>, RelayError>;

    /// Marks one owned notification read.  `None` if it is not owned by
    /// `user_id` or does not exist.
    async fn mark_notification_read(
        &self,
        user_id: UserId,
        id: NotificationId,
    ) -> Result<Option<Notification>, RelayError>;

    /// Marks every unread notification of `user_id` (optionally only those
    /// matching `query.kind`) read.  Returns how many changed.
    async fn mark_notifications_read(
        &self,
        user_id: UserId,
        query: NotificationQuery,
    ) -> Result<usize, RelayError>;

    /// Deletes one owned notification.  Returns `true` if it existed.
    async fn delete_notification(
        &self,
        user_id: UserId,
        id: NotificationId,
    ) -> Result<bool, RelayError>;
}
