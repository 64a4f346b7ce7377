//! Bounded, newest-first cache of the notifications a client has seen.
//!
//! The relay delivers at-least-once, so the same notification may arrive
//! twice after a reconnect.  [`NotificationHistory::push`] ignores an id it
//! already holds, and [`NotificationHistory::apply`] keeps read state in
//! sync with the `notification_update` events the server broadcasts.

use std::collections::VecDeque;
use std::str::FromStr;

use relay_core::{
    NotificationId, NotificationPayload, NotificationType, NotificationUpdate, ServerEvent,
};
use tracing::debug;

/// Capacity used when none is configured.
pub const DEFAULT_HISTORY_SIZE: usize = 100;

/// One cached notification plus its local read flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedNotification {
    pub notification: NotificationPayload,
    pub is_read: bool,
}

/// Ring buffer of notifications, newest at the front.
#[derive(Debug, Clone)]
pub struct NotificationHistory {
    capacity: usize,
    items: VecDeque<CachedNotification>,
}

impl Default for NotificationHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_SIZE)
    }
}

impl NotificationHistory {
    /// Creates an empty history.  A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            items: VecDeque::with_capacity(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Adds a notification at the front, evicting the oldest when full.
    ///
    /// Returns `false` and leaves the history untouched if a notification
    /// with the same id is already cached.
    pub fn push(&mut self, notification: NotificationPayload) -> bool {
        if self.get(notification.id).is_some() {
            debug!(id = %notification.id, "duplicate notification ignored");
            return false;
        }
        self.items.push_front(CachedNotification {
            notification,
            is_read: false,
        });
        self.items.truncate(self.capacity);
        true
    }

    pub fn get(&self, id: NotificationId) -> Option<&CachedNotification> {
        self.items.iter().find(|c| c.notification.id == id)
    }

    /// Newest first.
    pub fn iter(&self) -> impl Iterator<Item = &CachedNotification> {
        self.items.iter()
    }

    /// Marks one notification read.  Returns `true` if its flag changed.
    pub fn mark_read(&mut self, id: NotificationId) -> bool {
        match self.items.iter_mut().find(|c| c.notification.id == id) {
            Some(cached) if !cached.is_read => {
                cached.is_read = true;
                true
            }
            _ => false,
        }
    }

    /// Marks every unread notification of `kind` (or of any kind when
    /// `None`) read and returns how many changed.
    pub fn mark_all_read(&mut self, kind: Option<NotificationType>) -> usize {
        let mut changed = 0;
        for cached in self.items.iter_mut() {
            let matches = kind.map_or(true, |k| cached.notification.kind == k);
            if matches && !cached.is_read {
                cached.is_read = true;
                changed += 1;
            }
        }
        changed
    }

    pub fn remove(&mut self, id: NotificationId) -> bool {
        let before = self.items.len();
        self.items.retain(|c| c.notification.id != id);
        self.items.len() != before
    }

    pub fn unread_count(&self) -> usize {
        self.items.iter().filter(|c| !c.is_read).count()
    }

    /// Applies one server event to the cache.  Returns `true` if anything
    /// changed.  Events unrelated to notifications are ignored.
    pub fn apply(&mut self, event: &ServerEvent) -> bool {
        match event {
            ServerEvent::Notification { notification } => self.push(notification.clone()),
            ServerEvent::NotificationUpdate(update) => match update {
                NotificationUpdate::NotificationRead { notification_id } => {
                    self.mark_read(*notification_id)
                }
                NotificationUpdate::NotificationDeleted { notification_id } => {
                    self.remove(*notification_id)
                }
                NotificationUpdate::AllNotificationsRead { notification_type } => {
                    if notification_type == "all" {
                        return self.mark_all_read(None) > 0;
                    }
                    match NotificationType::from_str(notification_type) {
                        Ok(kind) => self.mark_all_read(Some(kind)) > 0,
                        Err(_) => {
                            debug!(%notification_type, "unknown type in all_notifications_read");
                            false
                        }
                    }
                }
            },
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn payload(kind: NotificationType, title: &str) -> NotificationPayload {
        NotificationPayload {
            id: Uuid::new_v4(),
            title: title.to_string(),
            content: "body".to_string(),
            kind,
            source_app: None,
            source_device_id: "m-1".to_string(),
            timestamp: Utc::now(),
            action_url: None,
            icon: None,
        }
    }

    fn titles(history: &NotificationHistory) -> Vec<String> {
        history.iter().map(|c| c.notification.title.clone()).collect()
    }

    #[test]
    fn test_push_keeps_newest_first_and_evicts_oldest() {
        // Arrange
        let mut history = NotificationHistory::new(2);

        // Act
        for title in ["a", "b", "c"] {
            history.push(payload(NotificationType::Message, title));
        }

        // Assert
        assert_eq!(titles(&history), vec!["c", "b"]);
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn test_push_ignores_duplicate_id() {
        let mut history = NotificationHistory::default();
        let n = payload(NotificationType::Email, "a");

        assert!(history.push(n.clone()));
        assert!(!history.push(n));
        assert_eq!(history.len(), 1);
        assert_eq!(history.capacity(), DEFAULT_HISTORY_SIZE);
    }

    #[test]
    fn test_zero_capacity_is_raised_to_one() {
        let mut history = NotificationHistory::new(0);
        history.push(payload(NotificationType::Call, "a"));
        history.push(payload(NotificationType::Call, "b"));

        assert_eq!(titles(&history), vec!["b"]);
    }

    #[test]
    fn test_mark_read_and_unread_count() {
        // Arrange
        let mut history = NotificationHistory::default();
        let n = payload(NotificationType::Email, "a");
        let id = n.id;
        history.push(n);
        history.push(payload(NotificationType::Email, "b"));

        // Act
        let first = history.mark_read(id);
        let again = history.mark_read(id);

        // Assert
        assert!(first);
        assert!(!again);
        assert_eq!(history.unread_count(), 1);
        assert!(!history.mark_read(Uuid::new_v4()));
    }

    #[test]
    fn test_mark_all_read_by_type() {
        // Arrange
        let mut history = NotificationHistory::default();
        history.push(payload(NotificationType::Email, "a"));
        history.push(payload(NotificationType::Email, "b"));
        history.push(payload(NotificationType::Call, "c"));

        // Act
        let emails = history.mark_all_read(Some(NotificationType::Email));
        let rest = history.mark_all_read(None);

        // Assert
        assert_eq!(emails, 2);
        assert_eq!(rest, 1);
        assert_eq!(history.unread_count(), 0);
    }

    #[test]
    fn test_apply_tracks_server_events_idempotently() {
        // Arrange
        let mut history = NotificationHistory::default();
        let n = payload(NotificationType::Message, "hi");
        let id = n.id;
        let delivered = ServerEvent::Notification { notification: n };
        let read = ServerEvent::NotificationUpdate(NotificationUpdate::NotificationRead {
            notification_id: id,
        });
        let deleted = ServerEvent::NotificationUpdate(NotificationUpdate::NotificationDeleted {
            notification_id: id,
        });

        // Act / Assert: delivery twice stores one copy
        assert!(history.apply(&delivered));
        assert!(!history.apply(&delivered));
        assert_eq!(history.len(), 1);

        // Act / Assert: read twice changes once
        assert!(history.apply(&read));
        assert!(!history.apply(&read));
        assert!(history.get(id).unwrap().is_read);

        // Act / Assert: delete twice removes once
        assert!(history.apply(&deleted));
        assert!(!history.apply(&deleted));
        assert!(history.is_empty());
    }

    #[test]
    fn test_apply_all_notifications_read_accepts_all_and_type_names() {
        // Arrange
        let mut history = NotificationHistory::default();
        history.push(payload(NotificationType::Email, "a"));
        history.push(payload(NotificationType::App, "b"));
        let event = |t: &str| {
            ServerEvent::NotificationUpdate(NotificationUpdate::AllNotificationsRead {
                notification_type: t.to_string(),
            })
        };

        // Act / Assert
        assert!(!history.apply(&event("fax")));
        assert!(history.apply(&event("email")));
        assert_eq!(history.unread_count(), 1);
        assert!(history.apply(&event("all")));
        assert_eq!(history.unread_count(), 0);
    }

    #[test]
    fn test_apply_ignores_unrelated_events() {
        let mut history = NotificationHistory::default();

        let changed = history.apply(&ServerEvent::Authenticated {
            success: true,
            message: None,
        });

        assert!(!changed);
    }
}
