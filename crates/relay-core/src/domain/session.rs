//! The pairing-session state machine.
//!
//! # Lifecycle (for beginners)
//!
//! ```text
//!             verify()                 disconnect() / sweep / device removed
//! Pending  ─────────────►  Active  ───────────────────────────────────────►  Terminated
//!    │                                                                           ▲
//!    └──────────────── expiry, supersession, disconnect() ──────────────────────┘
//! ```
//!
//! - `Pending`: the phone is showing a QR code; nobody has scanned it yet.
//! - `Active`: a second device scanned the code and the two are paired.
//! - `Terminated`: final.  The session records what ended it; a token ended
//!   by expiry reads as expired, any other terminated token reads as a token
//!   that never existed.
//!
//! Every session carries an absolute deadline.  A session whose deadline is
//! in the past is treated as expired whether or not the sweeper has visited
//! it yet.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::user::UserId;

/// Default lifetime of a pairing session.
pub const DEFAULT_SESSION_TTL_SECS: u64 = 15 * 60;

/// State of a pairing session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Pending,
    Active,
    Terminated,
}

/// What moved a session to `Terminated`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationCause {
    /// The deadline passed, noticed by `verify` or the sweeper.
    Expired,
    /// Either participant disconnected explicitly.
    Disconnected,
    /// The phone asked for a new QR code while this one was pending.
    Superseded,
    /// One of the participating devices was deleted.
    DeviceRemoved,
}

/// One pairing attempt between a phone and a counterpart device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairingSession {
    /// Opaque, globally unique token carried by the QR code.
    pub token: String,
    pub user_id: UserId,
    pub mobile_device_id: String,
    /// `Some` iff the session passed verification.
    pub counterpart_device_id: Option<String>,
    pub state: SessionState,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    /// `Some` iff `state` is `Terminated`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terminated_by: Option<TerminationCause>,
}

impl PairingSession {
    /// Creates a `Pending` session that expires `ttl` after `now`.
    pub fn pending(
        token: String,
        user_id: UserId,
        mobile_device_id: String,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Self {
        Self {
            token,
            user_id,
            mobile_device_id,
            counterpart_device_id: None,
            state: SessionState::Pending,
            created_at: now,
            expires_at: now + ttl,
            last_activity: now,
            terminated_by: None,
        }
    }

    /// `true` for `Pending` and `Active` sessions.
    pub fn is_live(&self) -> bool {
        self.state != SessionState::Terminated
    }

    /// `true` once `now` is strictly past the deadline.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }

    /// Moves the session to `Terminated`, recording `cause`.
    ///
    /// Returns `false` without touching anything if the session had already
    /// ended, so the first cause sticks.
    pub fn terminate(&mut self, cause: TerminationCause, at: DateTime<Utc>) -> bool {
        if !self.is_live() {
            return false;
        }
        self.state = SessionState::Terminated;
        self.terminated_by = Some(cause);
        self.last_activity = at;
        true
    }

    /// `true` if the session ended because its deadline passed.
    pub fn ended_by_expiry(&self) -> bool {
        self.terminated_by == Some(TerminationCause::Expired)
    }

    /// `true` if `device_id` is either end of this session.
    pub fn involves(&self, device_id: &str) -> bool {
        self.mobile_device_id == device_id
            || self.counterpart_device_id.as_deref() == Some(device_id)
    }

    /// Device identifiers of both ends, phone first.
    pub fn participants(&self) -> Vec<String> {
        let mut ids = vec![self.mobile_device_id.clone()];
        if let Some(counterpart) = &self.counterpart_device_id {
            ids.push(counterpart.clone());
        }
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn make_session(now: DateTime<Utc>) -> PairingSession {
        PairingSession::pending(
            "tok-1".to_string(),
            Uuid::new_v4(),
            "m-1".to_string(),
            now,
            Duration::seconds(DEFAULT_SESSION_TTL_SECS as i64),
        )
    }

    #[test]
    fn test_pending_session_expires_exactly_ttl_after_issue() {
        let now = Utc::now();
        let session = make_session(now);
        assert_eq!(session.expires_at - session.created_at, Duration::minutes(15));
        assert_eq!(session.state, SessionState::Pending);
        assert!(session.counterpart_device_id.is_none());
    }

    #[test]
    fn test_session_is_not_expired_at_its_deadline() {
        let now = Utc::now();
        let session = make_session(now);
        assert!(!session.is_expired_at(session.expires_at));
        assert!(session.is_expired_at(session.expires_at + Duration::milliseconds(1)));
    }

    #[test]
    fn test_terminated_session_is_not_live() {
        let mut session = make_session(Utc::now());
        assert!(session.is_live());
        session.state = SessionState::Terminated;
        assert!(!session.is_live());
    }

    #[test]
    fn test_first_termination_cause_sticks() {
        // Arrange
        let now = Utc::now();
        let mut session = make_session(now);

        // Act
        let first = session.terminate(TerminationCause::Disconnected, now);
        let second = session.terminate(TerminationCause::Expired, now + Duration::hours(1));

        // Assert
        assert!(first);
        assert!(!second);
        assert_eq!(session.state, SessionState::Terminated);
        assert_eq!(session.terminated_by, Some(TerminationCause::Disconnected));
        assert_eq!(session.last_activity, now);
        assert!(!session.ended_by_expiry());
    }

    #[test]
    fn test_termination_cause_serializes_only_when_set() {
        let mut session = make_session(Utc::now());
        let live = serde_json::to_value(&session).unwrap();
        assert!(live.get("terminatedBy").is_none());

        session.terminate(TerminationCause::DeviceRemoved, Utc::now());

        let ended = serde_json::to_value(&session).unwrap();
        assert_eq!(ended["terminatedBy"], "device_removed");
    }

    #[test]
    fn test_participants_lists_phone_then_counterpart() {
        let mut session = make_session(Utc::now());
        assert_eq!(session.participants(), vec!["m-1".to_string()]);

        session.counterpart_device_id = Some("d-1".to_string());

        assert_eq!(session.participants(), vec!["m-1".to_string(), "d-1".to_string()]);
        assert!(session.involves("d-1"));
        assert!(!session.involves("x-9"));
    }
}
