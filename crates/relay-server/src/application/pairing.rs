//! PairingService: issue, verify, disconnect and expire QR pairing sessions.
//!
//! # Pairing flow (for beginners)
//!
//! ```text
//! Phone                      Relay                         Desktop
//!   │  issue(m-1)              │                              │
//!   │ ───────────────────────► │ Pending session, token T     │
//!   │ ◄─────────────────────── │ QR(T)                        │
//!   │                          │         verify(T, d-1)       │
//!   │                          │ ◄─────────────────────────── │
//!   │  session_update          │ Active, m-1 + d-1 connected  │
//!   │ ◄─────────────────────── │ ───────────────────────────► │
//! ```
//!
//! # Races
//!
//! Every transition goes through a conditional store update that tells the
//! caller whether *it* performed the change.  Only that caller emits the
//! follow-up event, so a `verify` racing the sweeper (or another `verify`)
//! never produces duplicate or contradictory events:
//!
//! - two `verify` calls on one pending token: one activates, the other
//!   re-reads the session and returns `AlreadyPaired`;
//! - `verify` vs. the sweeper: whichever updates first wins, the loser
//!   re-reads and reports `Expired` or `NotFound`;
//! - two `issue` calls for one phone: the store supersedes and inserts in
//!   one step, so at most one `Pending` session per phone survives.
//!
//! A terminated token answers `Expired` only if expiry is what ended it.
//! Tokens ended by a disconnect, a newer QR code or a removed device answer
//! `NotFound`, before and after their deadline alike.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use relay_core::{
    Clock, Device, DeviceDescriptor, PairingSession, RelayError, ServerEvent, SessionState,
    SessionUpdate, TerminationCause, UserId,
};

use super::connection_registry::ConnectionRegistry;
use super::devices::DeviceRegistry;
use crate::infrastructure::qr::{render_data_url, PairingPayload};
use crate::infrastructure::storage::Store;

const INVALID_TOKEN: &str = "Invalid or expired QR code";
const SESSION_GONE: &str = "Session not found or already inactive";

/// Result of [`PairingService::issue`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedPairing {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    /// SVG QR code as a `data:` URL.
    pub qr_code: String,
}

/// A session together with its two devices, as returned to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub id: String,
    pub user: UserId,
    pub state: SessionState,
    pub is_active: bool,
    pub mobile_device: Option<Device>,
    pub computer_device: Option<Device>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

/// Use case owning the pairing-session state machine.
#[derive(Clone)]
pub struct PairingService {
    store: Arc<dyn Store>,
    devices: DeviceRegistry,
    connections: Arc<ConnectionRegistry>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
}

impl PairingService {
    pub fn new(
        store: Arc<dyn Store>,
        devices: DeviceRegistry,
        connections: Arc<ConnectionRegistry>,
        clock: Arc<dyn Clock>,
        ttl: Duration,
    ) -> Self {
        Self {
            store,
            devices,
            connections,
            clock,
            ttl,
        }
    }

    /// Starts a pairing attempt for the phone described by `mobile`.
    ///
    /// Any earlier `Pending` session of the same phone is superseded.
    ///
    /// # Errors
    ///
    /// [`RelayError::DeviceConflict`] if the phone's identifier belongs to
    /// another user.
    pub async fn issue(
        &self,
        user_id: UserId,
        mobile: &DeviceDescriptor,
    ) -> Result<IssuedPairing, RelayError> {
        let device = self.devices.upsert(user_id, mobile).await?;
        let now = self.clock.now();

        let token = Uuid::new_v4().to_string();
        let session = PairingSession::pending(
            token.clone(),
            user_id,
            device.device_id.clone(),
            now,
            self.ttl,
        );
        let expires_at = session.expires_at;
        for previous in self.store.replace_pending_session(session).await? {
            debug!(session = %previous.token, "superseded pending session");
        }

        let qr_code = render_data_url(&PairingPayload {
            session_id: &token,
            device_id: &device.device_id,
            user_id,
        })?;

        info!(user = %user_id, device = %device.device_id, session = %token, "pairing code issued");
        Ok(IssuedPairing {
            token,
            expires_at,
            qr_code,
        })
    }

    /// Completes a pairing attempt from the counterpart device.
    ///
    /// # Errors
    ///
    /// - [`RelayError::NotFound`]: unknown token, a token terminated by
    ///   anything other than expiry, or a token owned by a different user
    ///   than `caller`.
    /// - [`RelayError::Expired`]: a live session past its deadline, which is
    ///   terminated before this is returned, or a session that expiry already
    ///   ended.  Every retry answers the same.
    /// - [`RelayError::AlreadyPaired`]: another device already verified it.
    /// - [`RelayError::Validation`]: the phone tried to pair with itself.
    /// - [`RelayError::DeviceConflict`]: the counterpart identifier belongs
    ///   to another user.
    pub async fn verify(
        &self,
        caller: UserId,
        token: &str,
        counterpart: &DeviceDescriptor,
    ) -> Result<SessionView, RelayError> {
        let session = match self.store.session(token).await? {
            Some(s) if s.user_id == caller => s,
            _ => return Err(RelayError::not_found(INVALID_TOKEN)),
        };

        let now = self.clock.now();
        if !session.is_live() {
            return Err(if session.ended_by_expiry() {
                RelayError::Expired
            } else {
                RelayError::not_found(INVALID_TOKEN)
            });
        }
        if session.is_expired_at(now) {
            self.expire(token, now).await?;
            return Err(RelayError::Expired);
        }
        if session.state == SessionState::Active {
            return Err(RelayError::AlreadyPaired);
        }
        if counterpart.device_id == session.mobile_device_id {
            return Err(RelayError::validation("A device cannot pair with itself"));
        }

        let computer = self.devices.upsert(session.user_id, counterpart).await?;

        let active = match self
            .store
            .activate_session(token, &computer.device_id, now)
            .await?
        {
            Some(active) => active,
            None => return Err(self.explain_lost_race(token).await?),
        };

        self.devices.set_connected(&active.mobile_device_id, true).await?;
        self.devices.set_connected(&computer.device_id, true).await?;

        let event = ServerEvent::SessionUpdate(SessionUpdate::ConnectionEstablished {
            session_id: active.token.clone(),
            connected_devices: active.participants(),
        });
        let reached = self.connections.fan_out(active.user_id, &event);
        info!(
            user = %active.user_id,
            session = %active.token,
            counterpart = %computer.device_id,
            connections = reached,
            "devices paired"
        );

        self.view(active).await
    }

    /// Ends a live session.
    ///
    /// # Errors
    ///
    /// [`RelayError::NotFound`] if the session is unknown, already
    /// terminated, or owned by a different user than `caller`.  Callers may
    /// treat that as a successful no-op.
    pub async fn disconnect(&self, caller: UserId, token: &str) -> Result<(), RelayError> {
        match self.store.session(token).await? {
            Some(s) if s.user_id == caller => {}
            _ => return Err(RelayError::not_found(SESSION_GONE)),
        }
        match self
            .store
            .terminate_session(token, TerminationCause::Disconnected, self.clock.now())
            .await?
        {
            Some(ended) => self.devices.release_session(&ended).await,
            None => Err(RelayError::not_found(SESSION_GONE)),
        }
    }

    /// Terminates every live session past its deadline.  Returns how many
    /// sessions this call terminated.
    ///
    /// Safe to run concurrently with `verify`/`disconnect` and with itself.
    pub async fn sweep_expired(&self) -> Result<usize, RelayError> {
        let now = self.clock.now();
        let mut ended = 0;
        for session in self.store.sessions_expired_before(now).await? {
            if self.expire(&session.token, now).await? {
                ended += 1;
            }
        }
        if ended > 0 {
            info!(count = ended, "expired pairing sessions swept");
        }
        Ok(ended)
    }

    /// Live sessions of `user_id`, newest first, with both devices attached.
    /// Only `Active` sessions are included when `active_only` is set.
    pub async fn list_sessions(
        &self,
        user_id: UserId,
        active_only: bool,
    ) -> Result<Vec<SessionView>, RelayError> {
        let mut views = Vec::new();
        for session in self.store.live_sessions_for_user(user_id).await? {
            if active_only && session.state != SessionState::Active {
                continue;
            }
            views.push(self.view(session).await?);
        }
        Ok(views)
    }

    /// Terminates `token` if it is still live; returns `true` if this call
    /// performed the transition.
    async fn expire(&self, token: &str, now: DateTime<Utc>) -> Result<bool, RelayError> {
        match self
            .store
            .terminate_session(token, TerminationCause::Expired, now)
            .await?
        {
            Some(ended) => {
                self.devices.release_session(&ended).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Builds the error for a `verify` whose activation lost a race.
    async fn explain_lost_race(&self, token: &str) -> Result<RelayError, RelayError> {
        let current = self.store.session(token).await?;
        warn!(session = %token, "pairing verification lost a race");
        Ok(match current {
            Some(s) if s.state == SessionState::Active => RelayError::AlreadyPaired,
            Some(s) if s.ended_by_expiry() => RelayError::Expired,
            _ => RelayError::not_found(INVALID_TOKEN),
        })
    }

    async fn view(&self, session: PairingSession) -> Result<SessionView, RelayError> {
        let mobile_device = self.store.device(&session.mobile_device_id).await?;
        let computer_device = match &session.counterpart_device_id {
            Some(id) => self.store.device(id).await?,
            None => None,
        };
        Ok(SessionView {
            is_active: session.is_live(),
            id: session.token,
            user: session.user_id,
            state: session.state,
            mobile_device,
            computer_device,
            created_at: session.created_at,
            expires_at: session.expires_at,
            last_activity: session.last_activity,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::connection_registry::ConnectionHandle;
    use crate::infrastructure::storage::{MemoryStore, MockStore};
    use relay_core::ManualClock;

    struct Fixture {
        pairing: PairingService,
        store: Arc<dyn Store>,
        connections: Arc<ConnectionRegistry>,
        clock: Arc<ManualClock>,
    }

    fn make_fixture() -> Fixture {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let connections = Arc::new(ConnectionRegistry::new());
        let clock = Arc::new(ManualClock::default());
        let devices = DeviceRegistry::new(store.clone(), connections.clone(), clock.clone());
        let pairing = PairingService::new(
            store.clone(),
            devices,
            connections.clone(),
            clock.clone(),
            Duration::minutes(15),
        );
        Fixture {
            pairing,
            store,
            connections,
            clock,
        }
    }

    fn phone() -> DeviceDescriptor {
        DeviceDescriptor::parse("m-1", "mobile", "Pixel").unwrap()
    }

    fn laptop() -> DeviceDescriptor {
        DeviceDescriptor::parse("d-1", "laptop", "Work PC").unwrap()
    }

    #[tokio::test]
    async fn test_issue_creates_pending_session_with_ttl() {
        // Arrange
        let fx = make_fixture();
        let user = Uuid::new_v4();
        let now = fx.clock.now();

        // Act
        let issued = fx.pairing.issue(user, &phone()).await.unwrap();

        // Assert
        assert_eq!(issued.expires_at - now, Duration::minutes(15));
        assert!(issued.qr_code.starts_with("data:image/svg+xml;base64,"));
        let stored = fx.store.session(&issued.token).await.unwrap().unwrap();
        assert_eq!(stored.state, SessionState::Pending);
        assert_eq!(stored.mobile_device_id, "m-1");
    }

    #[tokio::test]
    async fn test_issue_supersedes_previous_pending_session() {
        let fx = make_fixture();
        let user = Uuid::new_v4();

        let first = fx.pairing.issue(user, &phone()).await.unwrap();
        let second = fx.pairing.issue(user, &phone()).await.unwrap();

        assert_ne!(first.token, second.token);
        let old = fx.store.session(&first.token).await.unwrap().unwrap();
        assert_eq!(old.state, SessionState::Terminated);
        assert_eq!(old.terminated_by, Some(TerminationCause::Superseded));
        assert!(matches!(
            fx.pairing.verify(user, &first.token, &laptop()).await,
            Err(RelayError::NotFound(_))
        ));
        fx.clock.advance(Duration::minutes(16));
        assert!(matches!(
            fx.pairing.verify(user, &first.token, &laptop()).await,
            Err(RelayError::NotFound(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_issue_leaves_one_pending_session_per_phone() {
        // Arrange
        let fx = make_fixture();
        let user = Uuid::new_v4();

        // Act
        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let pairing = fx.pairing.clone();
                tokio::spawn(async move { pairing.issue(user, &phone()).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        // Assert
        let pending = fx
            .store
            .live_sessions_for_device("m-1")
            .await
            .unwrap()
            .into_iter()
            .filter(|s| s.state == SessionState::Pending)
            .count();
        assert_eq!(pending, 1);
    }

    #[tokio::test]
    async fn test_issue_rejects_phone_owned_by_another_user() {
        let fx = make_fixture();
        fx.pairing.issue(Uuid::new_v4(), &phone()).await.unwrap();

        let result = fx.pairing.issue(Uuid::new_v4(), &phone()).await;

        assert!(matches!(result, Err(RelayError::DeviceConflict { .. })));
    }

    #[tokio::test]
    async fn test_verify_activates_and_broadcasts_connection_established() {
        // Arrange
        let fx = make_fixture();
        let user = Uuid::new_v4();
        let (handle, mut rx) = ConnectionHandle::channel(Some("m-1".to_string()));
        fx.connections.register(user, handle);
        let issued = fx.pairing.issue(user, &phone()).await.unwrap();

        // Act
        let view = fx.pairing.verify(user, &issued.token, &laptop()).await.unwrap();

        // Assert
        assert_eq!(view.state, SessionState::Active);
        assert!(view.is_active);
        assert_eq!(view.mobile_device.as_ref().unwrap().device_id, "m-1");
        assert!(view.mobile_device.as_ref().unwrap().is_connected);
        assert!(view.computer_device.as_ref().unwrap().is_connected);
        assert_eq!(
            rx.try_recv().unwrap(),
            ServerEvent::SessionUpdate(SessionUpdate::ConnectionEstablished {
                session_id: issued.token.clone(),
                connected_devices: vec!["m-1".to_string(), "d-1".to_string()],
            })
        );
    }

    #[tokio::test]
    async fn test_second_verify_fails_already_paired() {
        let fx = make_fixture();
        let user = Uuid::new_v4();
        let issued = fx.pairing.issue(user, &phone()).await.unwrap();
        fx.pairing.verify(user, &issued.token, &laptop()).await.unwrap();

        let other = DeviceDescriptor::parse("d-2", "desktop", "Home PC").unwrap();
        let result = fx.pairing.verify(user, &issued.token, &other).await;

        assert_eq!(result, Err(RelayError::AlreadyPaired));
        let stored = fx.store.session(&issued.token).await.unwrap().unwrap();
        assert_eq!(stored.counterpart_device_id.as_deref(), Some("d-1"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_verify_has_exactly_one_winner() {
        // Arrange
        let fx = make_fixture();
        let user = Uuid::new_v4();
        let issued = fx.pairing.issue(user, &phone()).await.unwrap();
        let a = fx.pairing.clone();
        let b = fx.pairing.clone();
        let token_a = issued.token.clone();
        let token_b = issued.token.clone();

        // Act
        let (ra, rb) = tokio::join!(
            tokio::spawn(async move { a.verify(user, &token_a, &laptop()).await }),
            tokio::spawn(async move {
                let other = DeviceDescriptor::parse("d-2", "desktop", "Home PC").unwrap();
                b.verify(user, &token_b, &other).await
            }),
        );
        let results = [ra.unwrap(), rb.unwrap()];

        // Assert
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert_eq!(
            results
                .iter()
                .filter(|r| matches!(r, Err(RelayError::AlreadyPaired)))
                .count(),
            1
        );
    }

    #[tokio::test]
    async fn test_verify_after_deadline_expires_session_on_every_retry() {
        // Arrange
        let fx = make_fixture();
        let user = Uuid::new_v4();
        let (handle, mut rx) = ConnectionHandle::channel(None);
        fx.connections.register(user, handle);
        let issued = fx.pairing.issue(user, &phone()).await.unwrap();
        fx.clock.advance(Duration::minutes(15) + Duration::seconds(1));

        // Act
        let first = fx.pairing.verify(user, &issued.token, &laptop()).await;

        // Assert
        assert_eq!(first, Err(RelayError::Expired));
        let stored = fx.store.session(&issued.token).await.unwrap().unwrap();
        assert_eq!(stored.state, SessionState::Terminated);
        assert_eq!(
            rx.try_recv().unwrap(),
            ServerEvent::SessionUpdate(SessionUpdate::ConnectionTerminated {
                session_id: issued.token.clone()
            })
        );
        let retry = fx.pairing.verify(user, &issued.token, &laptop()).await;
        assert_eq!(retry, Err(RelayError::Expired));
        assert!(rx.try_recv().is_err(), "retry must not emit a second termination");
        assert_eq!(
            fx.store.session(&issued.token).await.unwrap().unwrap().state,
            SessionState::Terminated
        );
    }

    #[tokio::test]
    async fn test_verify_disconnected_token_is_not_found() {
        let fx = make_fixture();
        let user = Uuid::new_v4();
        let issued = fx.pairing.issue(user, &phone()).await.unwrap();
        fx.pairing.disconnect(user, &issued.token).await.unwrap();

        let result = fx.pairing.verify(user, &issued.token, &laptop()).await;

        assert_eq!(result, Err(RelayError::not_found(INVALID_TOKEN)));
    }

    #[tokio::test]
    async fn test_verify_disconnected_token_stays_not_found_after_deadline() {
        // Arrange
        let fx = make_fixture();
        let user = Uuid::new_v4();
        let issued = fx.pairing.issue(user, &phone()).await.unwrap();
        fx.pairing.disconnect(user, &issued.token).await.unwrap();

        // Act
        fx.clock.advance(Duration::minutes(15) + Duration::seconds(1));
        let result = fx.pairing.verify(user, &issued.token, &laptop()).await;

        // Assert
        assert_eq!(result, Err(RelayError::not_found(INVALID_TOKEN)));
        let stored = fx.store.session(&issued.token).await.unwrap().unwrap();
        assert_eq!(stored.terminated_by, Some(TerminationCause::Disconnected));
    }

    #[tokio::test]
    async fn test_verify_token_ended_by_sweep_answers_expired() {
        let fx = make_fixture();
        let user = Uuid::new_v4();
        let issued = fx.pairing.issue(user, &phone()).await.unwrap();
        fx.clock.advance(Duration::minutes(16));
        assert_eq!(fx.pairing.sweep_expired().await.unwrap(), 1);

        let result = fx.pairing.verify(user, &issued.token, &laptop()).await;

        assert_eq!(result, Err(RelayError::Expired));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_verify_racing_sweep_on_expired_session_terminates_once() {
        for _ in 0..16 {
            // Arrange
            let fx = make_fixture();
            let user = Uuid::new_v4();
            let issued = fx.pairing.issue(user, &phone()).await.unwrap();
            let (handle, mut rx) = ConnectionHandle::channel(None);
            fx.connections.register(user, handle);
            fx.clock.advance(Duration::minutes(15) + Duration::seconds(1));
            let verifier = fx.pairing.clone();
            let sweeper = fx.pairing.clone();
            let token = issued.token.clone();

            // Act
            let (verified, swept) = tokio::join!(
                tokio::spawn(async move { verifier.verify(user, &token, &laptop()).await }),
                tokio::spawn(async move { sweeper.sweep_expired().await }),
            );

            // Assert
            assert_eq!(verified.unwrap(), Err(RelayError::Expired));
            assert!(swept.unwrap().unwrap() <= 1);
            let mut terminated = 0;
            while let Ok(event) = rx.try_recv() {
                if let ServerEvent::SessionUpdate(SessionUpdate::ConnectionTerminated {
                    session_id,
                }) = event
                {
                    assert_eq!(session_id, issued.token);
                    terminated += 1;
                }
            }
            assert_eq!(terminated, 1);
            let stored = fx.store.session(&issued.token).await.unwrap().unwrap();
            assert_eq!(stored.terminated_by, Some(TerminationCause::Expired));
        }
    }

    #[tokio::test]
    async fn test_verify_unknown_token_is_not_found() {
        let fx = make_fixture();
        let result = fx.pairing.verify(Uuid::new_v4(), "nope", &laptop()).await;
        assert_eq!(result, Err(RelayError::not_found(INVALID_TOKEN)));
    }

    #[tokio::test]
    async fn test_verify_by_another_user_is_not_found() {
        let fx = make_fixture();
        let issued = fx.pairing.issue(Uuid::new_v4(), &phone()).await.unwrap();

        let result = fx.pairing.verify(Uuid::new_v4(), &issued.token, &laptop()).await;

        assert!(matches!(result, Err(RelayError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_verify_with_the_phone_itself_is_rejected() {
        let fx = make_fixture();
        let user = Uuid::new_v4();
        let issued = fx.pairing.issue(user, &phone()).await.unwrap();

        let result = fx.pairing.verify(user, &issued.token, &phone()).await;

        assert!(matches!(result, Err(RelayError::Validation(_))));
    }

    #[tokio::test]
    async fn test_disconnect_terminates_and_marks_devices_disconnected() {
        // Arrange
        let fx = make_fixture();
        let user = Uuid::new_v4();
        let issued = fx.pairing.issue(user, &phone()).await.unwrap();
        fx.pairing.verify(user, &issued.token, &laptop()).await.unwrap();
        let (handle, mut rx) = ConnectionHandle::channel(None);
        fx.connections.register(user, handle);

        // Act
        fx.pairing.disconnect(user, &issued.token).await.unwrap();

        // Assert
        assert!(!fx.store.device("m-1").await.unwrap().unwrap().is_connected);
        assert!(!fx.store.device("d-1").await.unwrap().unwrap().is_connected);
        assert!(matches!(
            rx.try_recv().unwrap(),
            ServerEvent::SessionUpdate(SessionUpdate::ConnectionTerminated { .. })
        ));
        assert_eq!(
            fx.pairing.disconnect(user, &issued.token).await,
            Err(RelayError::not_found(SESSION_GONE))
        );
    }

    #[tokio::test]
    async fn test_sweep_terminates_only_expired_sessions_once() {
        // Arrange
        let fx = make_fixture();
        let user = Uuid::new_v4();
        let old = fx.pairing.issue(user, &phone()).await.unwrap();
        fx.clock.advance(Duration::minutes(10));
        let tablet = DeviceDescriptor::parse("t-1", "mobile", "Tablet").unwrap();
        let fresh = fx.pairing.issue(user, &tablet).await.unwrap();
        fx.clock.advance(Duration::minutes(6));

        // Act
        let first = fx.pairing.sweep_expired().await.unwrap();
        let second = fx.pairing.sweep_expired().await.unwrap();

        // Assert
        assert_eq!(first, 1);
        assert_eq!(second, 0);
        assert_eq!(
            fx.store.session(&old.token).await.unwrap().unwrap().state,
            SessionState::Terminated
        );
        assert_eq!(
            fx.store.session(&fresh.token).await.unwrap().unwrap().state,
            SessionState::Pending
        );
    }

    #[tokio::test]
    async fn test_list_sessions_active_only_filters_pending() {
        let fx = make_fixture();
        let user = Uuid::new_v4();
        let paired = fx.pairing.issue(user, &phone()).await.unwrap();
        fx.pairing.verify(user, &paired.token, &laptop()).await.unwrap();
        let tablet = DeviceDescriptor::parse("t-1", "mobile", "Tablet").unwrap();
        fx.pairing.issue(user, &tablet).await.unwrap();

        let active = fx.pairing.list_sessions(user, true).await.unwrap();
        let live = fx.pairing.list_sessions(user, false).await.unwrap();

        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, paired.token);
        assert_eq!(live.len(), 2);
    }

    #[tokio::test]
    async fn test_storage_failure_propagates_from_sweep() {
        // Arrange
        let mut mock = MockStore::new();
        mock.expect_sessions_expired_before()
            .returning(|_| Err(RelayError::Storage("disk on fire".to_string())));
        let store: Arc<dyn Store> = Arc::new(mock);
        let connections = Arc::new(ConnectionRegistry::new());
        let clock = Arc::new(ManualClock::default());
        let devices = DeviceRegistry::new(store.clone(), connections.clone(), clock.clone());
        let pairing = PairingService::new(store, devices, connections, clock, Duration::minutes(15));

        // Act
        let result = pairing.sweep_expired().await;

        // Assert
        assert!(matches!(result, Err(RelayError::Storage(_))));
    }
}
