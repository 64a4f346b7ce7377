//! In-process implementation of [`Store`].
//!
//! All tables live behind one `tokio::sync::RwLock`, so every trait method is
//! a single critical section and the conditional updates are trivially
//! atomic.  Nothing survives a restart.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use relay_core::{
    Device, Notification, NotificationId, NotificationQuery, PairingSession, RelayError,
    SessionState, TerminationCause, User, UserId,
};

use super::Store;

#[derive(Default)]
struct Tables {
    users: HashMap<UserId, User>,
    /// Lower-cased email → owner; enforces uniqueness.
    emails: HashMap<String, UserId>,
    devices: HashMap<String, Device>,
    sessions: HashMap<String, PairingSession>,
    notifications: HashMap<NotificationId, Notification>,
}

/// Volatile store used by the server binary and by tests.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_user(&self, user: User) -> Result<(), RelayError> {
        let mut t = self.tables.write().await;
        if t.emails.contains_key(&user.email) {
            return Err(RelayError::EmailInUse);
        }
        t.emails.insert(user.email.clone(), user.id);
        t.users.insert(user.id, user);
        Ok(())
    }

    async fn user(&self, id: UserId) -> Result<Option<User>, RelayError> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn user_by_email(&self, email: &str) -> Result<Option<User>, RelayError> {
        let t = self.tables.read().await;
        Ok(t.emails.get(email).and_then(|id| t.users.get(id)).cloned())
    }

    async fn update_user(&self, user: User) -> Result<(), RelayError> {
        let mut t = self.tables.write().await;
        let previous_email = match t.users.get(&user.id) {
            Some(existing) => existing.email.clone(),
            None => return Err(RelayError::not_found("User not found")),
        };
        if let Some(owner) = t.emails.get(&user.email) {
            if *owner != user.id {
                return Err(RelayError::EmailInUse);
            }
        }
        t.emails.remove(&previous_email);
        t.emails.insert(user.email.clone(), user.id);
        t.users.insert(user.id, user);
        Ok(())
    }

    async fn device(&self, device_id: &str) -> Result<Option<Device>, RelayError> {
        Ok(self.tables.read().await.devices.get(device_id).cloned())
    }

    async fn insert_device_if_absent(&self, device: Device) -> Result<Device, RelayError> {
        let mut t = self.tables.write().await;
        let stored = t
            .devices
            .entry(device.device_id.clone())
            .or_insert(device);
        Ok(stored.clone())
    }

    async fn set_device_connected(
        &self,
        device_id: &str,
        connected: bool,
        at: DateTime<Utc>,
    ) -> Result<Option<Device>, RelayError> {
        let mut t = self.tables.write().await;
        Ok(t.devices.get_mut(device_id).map(|device| {
            device.is_connected = connected;
            device.last_active = at;
            device.clone()
        }))
    }

    async fn touch_device(&self, device_id: &str, at: DateTime<Utc>) -> Result<(), RelayError> {
        if let Some(device) = self.tables.write().await.devices.get_mut(device_id) {
            device.last_active = at;
        }
        Ok(())
    }

    async fn rename_device(
        &self,
        device_id: &str,
        name: String,
    ) -> Result<Option<Device>, RelayError> {
        let mut t = self.tables.write().await;
        Ok(t.devices.get_mut(device_id).map(|device| {
            device.name = name;
            device.clone()
        }))
    }

    async fn delete_device(&self, device_id: &str) -> Result<bool, RelayError> {
        Ok(self.tables.write().await.devices.remove(device_id).is_some())
    }

    async fn devices_for_user(&self, user_id: UserId) -> Result<Vec<Device>, RelayError> {
        let t = self.tables.read().await;
        let mut devices: Vec<Device> = t
            .devices
            .values()
            .filter(|d| d.user_id == user_id)
            .cloned()
            .collect();
        devices.sort_by(|a, b| b.last_active.cmp(&a.last_active));
        Ok(devices)
    }

    async fn insert_session(&self, session: PairingSession) -> Result<(), RelayError> {
        let mut t = self.tables.write().await;
        if t.sessions.contains_key(&session.token) {
            return Err(RelayError::Storage(format!(
                "duplicate session token {}",
                session.token
            )));
        }
        t.sessions.insert(session.token.clone(), session);
        Ok(())
    }

    async fn replace_pending_session(
        &self,
        session: PairingSession,
    ) -> Result<Vec<PairingSession>, RelayError> {
        let mut t = self.tables.write().await;
        if t.sessions.contains_key(&session.token) {
            return Err(RelayError::Storage(format!(
                "duplicate session token {}",
                session.token
            )));
        }
        let mut superseded = Vec::new();
        for previous in t.sessions.values_mut() {
            if previous.state == SessionState::Pending
                && previous.mobile_device_id == session.mobile_device_id
                && previous.terminate(TerminationCause::Superseded, session.created_at)
            {
                superseded.push(previous.clone());
            }
        }
        t.sessions.insert(session.token.clone(), session);
        Ok(superseded)
    }

    async fn session(&self, token: &str) -> Result<Option<PairingSession>, RelayError> {
        Ok(self.tables.read().await.sessions.get(token).cloned())
    }

    async fn activate_session(
        &self,
        token: &str,
        counterpart_device_id: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<PairingSession>, RelayError> {
        let mut t = self.tables.write().await;
        match t.sessions.get_mut(token) {
            Some(session) if session.state == SessionState::Pending => {
                session.state = SessionState::Active;
                session.counterpart_device_id = Some(counterpart_device_id.to_string());
                session.last_activity = at;
                Ok(Some(session.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn terminate_session(
        &self,
        token: &str,
        cause: TerminationCause,
        at: DateTime<Utc>,
    ) -> Result<Option<PairingSession>, RelayError> {
        let mut t = self.tables.write().await;
        match t.sessions.get_mut(token) {
            Some(session) => {
                if session.terminate(cause, at) {
                    Ok(Some(session.clone()))
                } else {
                    Ok(None)
                }
            }
            _ => Ok(None),
        }
    }

    async fn sessions_expired_before(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<PairingSession>, RelayError> {
        let t = self.tables.read().await;
        Ok(t.sessions
            .values()
            .filter(|s| s.is_live() && s.is_expired_at(now))
            .cloned()
            .collect())
    }

    async fn live_sessions_for_device(
        &self,
        device_id: &str,
    ) -> Result<Vec<PairingSession>, RelayError> {
        let t = self.tables.read().await;
        Ok(t.sessions
            .values()
            .filter(|s| s.is_live() && s.involves(device_id))
            .cloned()
            .collect())
    }

    async fn live_sessions_for_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<PairingSession>, RelayError> {
        let t = self.tables.read().await;
        let mut sessions: Vec<PairingSession> = t
            .sessions
            .values()
            .filter(|s| s.is_live() && s.user_id == user_id)
            .cloned()
            .collect();
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(sessions)
    }

    async fn insert_notification(&self, notification: Notification) -> Result<(), RelayError> {
        self.tables
            .write()
            .await
            .notifications
            .insert(notification.id, notification);
        Ok(())
    }

    async fn query_notifications(
        &self,
        user_id: UserId,
        query: NotificationQuery,
    ) -> Result<(Vec<Notification>, usize), RelayError> {
        let t = self.tables.read().await;
        let mut matching: Vec<&Notification> = t
            .notifications
            .values()
            .filter(|n| n.user_id == user_id && query.matches(n))
            .collect();
        matching.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        let total = matching.len();
        let page = matching
            .into_iter()
            .skip(query.skip)
            .take(query.limit)
            .cloned()
            .collect();
        Ok((page, total))
    }

    async fn notifications_for_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<Notification>, RelayError> {
        let t = self.tables.read().await;
        Ok(t.notifications
            .values()
            .filter(|n| n.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn mark_notification_read(
        &self,
        user_id: UserId,
        id: NotificationId,
    ) -> Result<Option<Notification>, RelayError> {
        let mut t = self.tables.write().await;
        Ok(t.notifications
            .get_mut(&id)
            .filter(|n| n.user_id == user_id)
            .map(|n| {
                n.is_read = true;
                n.clone()
            }))
    }

    async fn mark_notifications_read(
        &self,
        user_id: UserId,
        query: NotificationQuery,
    ) -> Result<usize, RelayError> {
        let mut t = self.tables.write().await;
        let mut changed = 0;
        for n in t.notifications.values_mut() {
            if n.user_id == user_id && !n.is_read && query.kind.map_or(true, |k| n.kind == k) {
                n.is_read = true;
                changed += 1;
            }
        }
        Ok(changed)
    }

    async fn delete_notification(
        &self,
        user_id: UserId,
        id: NotificationId,
    ) -> Result<bool, RelayError> {
        let mut t = self.tables.write().await;
        match t.notifications.get(&id) {
            Some(n) if n.user_id == user_id => {
                t.notifications.remove(&id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use relay_core::{DeviceDescriptor, NewNotification, NotificationPreferences, NotificationType};
    use uuid::Uuid;

    fn make_user(email: &str) -> User {
        User {
            id: Uuid::new_v4(),
            name: "Alice".to_string(),
            email: email.to_string(),
            password_hash: "$argon2id$stub".to_string(),
            notification_settings: NotificationPreferences::default(),
            created_at: Utc::now(),
        }
    }

    fn make_session(token: &str, user: UserId, now: DateTime<Utc>) -> PairingSession {
        PairingSession::pending(
            token.to_string(),
            user,
            "m-1".to_string(),
            now,
            Duration::minutes(15),
        )
    }

    fn make_notification(user: UserId, kind: &str, at: DateTime<Utc>) -> Notification {
        NewNotification {
            title: Some("t".to_string()),
            content: Some("c".to_string()),
            kind: Some(kind.to_string()),
            source_device_id: Some("m-1".to_string()),
            ..Default::default()
        }
        .into_notification(user, at)
        .unwrap()
    }

    #[tokio::test]
    async fn test_insert_user_rejects_duplicate_email() {
        let store = MemoryStore::new();
        store.insert_user(make_user("a@x.io")).await.unwrap();

        let result = store.insert_user(make_user("a@x.io")).await;

        assert_eq!(result, Err(RelayError::EmailInUse));
    }

    #[tokio::test]
    async fn test_update_user_moves_email_index() {
        // Arrange
        let store = MemoryStore::new();
        let mut user = make_user("old@x.io");
        store.insert_user(user.clone()).await.unwrap();

        // Act
        user.email = "new@x.io".to_string();
        store.update_user(user.clone()).await.unwrap();

        // Assert
        assert!(store.user_by_email("old@x.io").await.unwrap().is_none());
        assert_eq!(store.user_by_email("new@x.io").await.unwrap().unwrap().id, user.id);
        // The old address is free again.
        store.insert_user(make_user("old@x.io")).await.unwrap();
    }

    #[tokio::test]
    async fn test_update_user_rejects_email_owned_by_someone_else() {
        let store = MemoryStore::new();
        store.insert_user(make_user("taken@x.io")).await.unwrap();
        let mut user = make_user("mine@x.io");
        store.insert_user(user.clone()).await.unwrap();

        user.email = "taken@x.io".to_string();

        assert_eq!(store.update_user(user).await, Err(RelayError::EmailInUse));
    }

    #[tokio::test]
    async fn test_insert_device_if_absent_keeps_first_owner() {
        // Arrange
        let store = MemoryStore::new();
        let descriptor = DeviceDescriptor::parse("m-1", "mobile", "Pixel").unwrap();
        let first = Device::new(Uuid::new_v4(), &descriptor, Utc::now());
        let second = Device::new(Uuid::new_v4(), &descriptor, Utc::now());

        // Act
        store.insert_device_if_absent(first.clone()).await.unwrap();
        let stored = store.insert_device_if_absent(second).await.unwrap();

        // Assert
        assert_eq!(stored.user_id, first.user_id);
    }

    #[tokio::test]
    async fn test_activate_session_only_succeeds_from_pending() {
        // Arrange
        let store = MemoryStore::new();
        let now = Utc::now();
        store
            .insert_session(make_session("tok", Uuid::new_v4(), now))
            .await
            .unwrap();

        // Act
        let first = store.activate_session("tok", "d-1", now).await.unwrap();
        let second = store.activate_session("tok", "d-2", now).await.unwrap();

        // Assert
        let first = first.expect("first activation wins");
        assert_eq!(first.state, SessionState::Active);
        assert_eq!(first.counterpart_device_id.as_deref(), Some("d-1"));
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn test_terminate_session_reports_only_the_transitioning_call() {
        let store = MemoryStore::new();
        let now = Utc::now();
        store
            .insert_session(make_session("tok", Uuid::new_v4(), now))
            .await
            .unwrap();

        assert!(store
            .terminate_session("tok", TerminationCause::Disconnected, now)
            .await
            .unwrap()
            .is_some());
        assert!(store
            .terminate_session("tok", TerminationCause::Expired, now)
            .await
            .unwrap()
            .is_none());
        assert_eq!(
            store.session("tok").await.unwrap().unwrap().terminated_by,
            Some(TerminationCause::Disconnected)
        );
        assert!(store.activate_session("tok", "d-1", now).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_insert_session_rejects_duplicate_token() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let user = Uuid::new_v4();
        store.insert_session(make_session("tok", user, now)).await.unwrap();

        let result = store.insert_session(make_session("tok", user, now)).await;

        assert!(matches!(result, Err(RelayError::Storage(_))));
    }

    #[tokio::test]
    async fn test_replace_pending_session_supersedes_only_the_same_phone() {
        // Arrange
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        let now = Utc::now();
        store.insert_session(make_session("old", user, now)).await.unwrap();
        store
            .insert_session(PairingSession::pending(
                "tablet".to_string(),
                user,
                "t-1".to_string(),
                now,
                Duration::minutes(15),
            ))
            .await
            .unwrap();
        store.insert_session(make_session("paired", user, now)).await.unwrap();
        store.activate_session("paired", "d-1", now).await.unwrap();
        let later = now + Duration::minutes(1);

        // Act
        let superseded = store
            .replace_pending_session(make_session("new", user, later))
            .await
            .unwrap();

        // Assert
        let tokens: Vec<&str> = superseded.iter().map(|s| s.token.as_str()).collect();
        assert_eq!(tokens, vec!["old"]);
        let old = store.session("old").await.unwrap().unwrap();
        assert_eq!(old.terminated_by, Some(TerminationCause::Superseded));
        assert_eq!(old.last_activity, later);
        assert_eq!(
            store.session("tablet").await.unwrap().unwrap().state,
            SessionState::Pending
        );
        assert_eq!(
            store.session("paired").await.unwrap().unwrap().state,
            SessionState::Active
        );
        assert_eq!(
            store.session("new").await.unwrap().unwrap().state,
            SessionState::Pending
        );
    }

    #[tokio::test]
    async fn test_replace_pending_session_with_duplicate_token_changes_nothing() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        let now = Utc::now();
        store.insert_session(make_session("tok", user, now)).await.unwrap();

        let result = store.replace_pending_session(make_session("tok", user, now)).await;

        assert!(matches!(result, Err(RelayError::Storage(_))));
        assert_eq!(
            store.session("tok").await.unwrap().unwrap().state,
            SessionState::Pending
        );
    }

    #[tokio::test]
    async fn test_sessions_expired_before_skips_terminated_and_fresh_sessions() {
        // Arrange
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        let long_ago = Utc::now() - Duration::hours(1);
        store.insert_session(make_session("old", user, long_ago)).await.unwrap();
        store.insert_session(make_session("old-done", user, long_ago)).await.unwrap();
        store
            .terminate_session("old-done", TerminationCause::Disconnected, long_ago)
            .await
            .unwrap();
        store.insert_session(make_session("fresh", user, Utc::now())).await.unwrap();

        // Act
        let expired = store.sessions_expired_before(Utc::now()).await.unwrap();

        // Assert
        let tokens: Vec<&str> = expired.iter().map(|s| s.token.as_str()).collect();
        assert_eq!(tokens, vec!["old"]);
    }

    #[tokio::test]
    async fn test_query_notifications_sorts_newest_first_and_pages() {
        // Arrange
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        let base = Utc::now();
        for i in 0..5 {
            store
                .insert_notification(make_notification(user, "email", base + Duration::seconds(i)))
                .await
                .unwrap();
        }
        store
            .insert_notification(make_notification(Uuid::new_v4(), "email", base))
            .await
            .unwrap();

        // Act
        let query = NotificationQuery {
            limit: 2,
            skip: 1,
            ..Default::default()
        };
        let (page, total) = store.query_notifications(user, query).await.unwrap();

        // Assert
        assert_eq!(total, 5);
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].timestamp, base + Duration::seconds(3));
        assert_eq!(page[1].timestamp, base + Duration::seconds(2));
    }

    #[tokio::test]
    async fn test_notification_mutations_are_owner_scoped() {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();
        let stranger = Uuid::new_v4();
        let n = make_notification(owner, "call", Utc::now());
        let id = n.id;
        store.insert_notification(n).await.unwrap();

        assert!(store.mark_notification_read(stranger, id).await.unwrap().is_none());
        assert!(!store.delete_notification(stranger, id).await.unwrap());
        assert!(store.mark_notification_read(owner, id).await.unwrap().unwrap().is_read);
        assert!(store.delete_notification(owner, id).await.unwrap());
    }

    #[tokio::test]
    async fn test_mark_notifications_read_filters_by_type() {
        // Arrange
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        store.insert_notification(make_notification(user, "email", Utc::now())).await.unwrap();
        store.insert_notification(make_notification(user, "email", Utc::now())).await.unwrap();
        store.insert_notification(make_notification(user, "call", Utc::now())).await.unwrap();

        // Act
        let query = NotificationQuery {
            kind: Some(NotificationType::Email),
            ..Default::default()
        };
        let changed = store.mark_notifications_read(user, query).await.unwrap();
        let again = store.mark_notifications_read(user, query).await.unwrap();

        // Assert
        assert_eq!(changed, 2);
        assert_eq!(again, 0);
        let unread = store
            .notifications_for_user(user)
            .await
            .unwrap()
            .into_iter()
            .filter(|n| !n.is_read)
            .count();
        assert_eq!(unread, 1);
    }
}
