//! NotificationPipeline: filter, persist and fan out relayed notifications.
//!
//! ```text
//! submit ─► validate ─► preferences.decide ─┬─► Blocked  → delivered=false, nothing stored
//!                                           └─► Deliver  → store → fan_out("notification")
//! ```
//!
//! `delivered` reports whether the user had at least one live connection at
//! the moment of submission.  It is a hint, not an acknowledgement: delivery
//! over the real-time channel is best-effort.

use std::sync::Arc;

use tracing::{debug, info, warn};

use relay_core::{
    Clock, DeliveryDecision, DeviceDescriptor, DeviceKind, NewNotification, Notification,
    NotificationId, NotificationPage, NotificationQuery, NotificationStats, NotificationType,
    NotificationUpdate, RelayError, ServerEvent, UserId,
};

use super::connection_registry::ConnectionRegistry;
use super::devices::DeviceRegistry;
use crate::infrastructure::storage::Store;

/// Page-size limits for [`NotificationPipeline::list`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageLimits {
    pub default_size: usize,
    pub max_size: usize,
}

impl Default for PageLimits {
    fn default() -> Self {
        Self {
            default_size: 20,
            max_size: 100,
        }
    }
}

/// Raw listing parameters as they arrive from a client.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListRequest {
    pub limit: Option<usize>,
    pub skip: Option<usize>,
    pub kind: Option<String>,
    pub is_read: Option<bool>,
}

/// Result of [`NotificationPipeline::submit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    /// Stored; `delivered` is whether a live connection existed.
    Accepted {
        notification: Notification,
        delivered: bool,
    },
    /// Dropped by the user's delivery preferences.  Not an error.
    Blocked(DeliveryDecision),
}

impl Submission {
    pub fn delivered(&self) -> bool {
        matches!(self, Self::Accepted { delivered: true, .. })
    }
}

/// Use case for the notification lifecycle.
#[derive(Clone)]
pub struct NotificationPipeline {
    store: Arc<dyn Store>,
    devices: DeviceRegistry,
    connections: Arc<ConnectionRegistry>,
    clock: Arc<dyn Clock>,
    limits: PageLimits,
}

impl NotificationPipeline {
    pub fn new(
        store: Arc<dyn Store>,
        devices: DeviceRegistry,
        connections: Arc<ConnectionRegistry>,
        clock: Arc<dyn Clock>,
        limits: PageLimits,
    ) -> Self {
        Self {
            store,
            devices,
            connections,
            clock,
            limits,
        }
    }

    /// Runs a submission through the filter and, if it passes, stores it and
    /// pushes it to every live connection of the user.
    ///
    /// The reporting device is registered lazily (as a phone) the first time
    /// it is seen.
    ///
    /// # Errors
    ///
    /// - [`RelayError::Validation`] for missing fields or an unknown type.
    /// - [`RelayError::NotFound`] if the user does not exist.
    ///
    /// A source device registered to another user does not fail the
    /// submission; the notification is relayed without registering it.
    pub async fn submit(
        &self,
        user_id: UserId,
        submission: NewNotification,
    ) -> Result<Submission, RelayError> {
        let now = self.clock.now();
        let notification = submission.into_notification(user_id, now)?;

        let user = self
            .store
            .user(user_id)
            .await?
            .ok_or_else(|| RelayError::not_found("User not found"))?;

        let decision = user
            .notification_settings
            .decide(notification.kind, notification.source_app.as_deref());
        if decision.is_blocked() {
            debug!(user = %user_id, kind = %notification.kind, ?decision, "notification blocked by settings");
            return Ok(Submission::Blocked(decision));
        }

        match self.record_source(user_id, &notification.source_device_id).await {
            Err(RelayError::DeviceConflict { device_id }) => warn!(
                user = %user_id,
                device = %device_id,
                "source device belongs to another user; not registering it"
            ),
            other => other?,
        }
        self.store.insert_notification(notification.clone()).await?;

        let delivered = self.connections.is_connected(user_id);
        if delivered {
            self.connections
                .fan_out(user_id, &ServerEvent::notification(&notification));
        }

        info!(
            user = %user_id,
            notification = %notification.id,
            kind = %notification.kind,
            delivered,
            "notification relayed"
        );
        Ok(Submission::Accepted {
            notification,
            delivered,
        })
    }

    /// Lists notifications newest first.
    ///
    /// # Errors
    ///
    /// [`RelayError::Validation`] for an unknown type filter or a zero limit.
    pub async fn list(
        &self,
        user_id: UserId,
        request: ListRequest,
    ) -> Result<NotificationPage, RelayError> {
        let limit = request.limit.unwrap_or(self.limits.default_size);
        if limit == 0 {
            return Err(RelayError::validation("limit must be at least 1"));
        }
        let query = NotificationQuery {
            limit: limit.min(self.limits.max_size),
            skip: request.skip.unwrap_or(0),
            kind: parse_kind(request.kind.as_deref())?,
            is_read: request.is_read,
        };

        let (notifications, total) = self.store.query_notifications(user_id, query).await?;
        Ok(NotificationPage {
            count: notifications.len(),
            total,
            notifications,
        })
    }

    /// Marks one notification read.
    ///
    /// # Errors
    ///
    /// [`RelayError::NotFound`] if it is missing or owned by someone else.
    pub async fn mark_read(
        &self,
        user_id: UserId,
        id: NotificationId,
    ) -> Result<Notification, RelayError> {
        let notification = self
            .store
            .mark_notification_read(user_id, id)
            .await?
            .ok_or_else(notification_not_found)?;
        self.connections.fan_out(
            user_id,
            &ServerEvent::NotificationUpdate(NotificationUpdate::NotificationRead {
                notification_id: id,
            }),
        );
        Ok(notification)
    }

    /// Marks every unread notification read, optionally only one type.
    /// Returns how many changed.
    pub async fn mark_all_read(
        &self,
        user_id: UserId,
        kind: Option<&str>,
    ) -> Result<usize, RelayError> {
        let kind = parse_kind(kind)?;
        let query = NotificationQuery {
            kind,
            ..Default::default()
        };
        let changed = self.store.mark_notifications_read(user_id, query).await?;
        self.connections.fan_out(
            user_id,
            &ServerEvent::NotificationUpdate(NotificationUpdate::AllNotificationsRead {
                notification_type: kind.map_or("all", NotificationType::as_str).to_string(),
            }),
        );
        Ok(changed)
    }

    /// Deletes one notification.
    ///
    /// # Errors
    ///
    /// [`RelayError::NotFound`] if it is missing or owned by someone else.
    pub async fn delete(&self, user_id: UserId, id: NotificationId) -> Result<(), RelayError> {
        if !self.store.delete_notification(user_id, id).await? {
            return Err(notification_not_found());
        }
        self.connections.fan_out(
            user_id,
            &ServerEvent::NotificationUpdate(NotificationUpdate::NotificationDeleted {
                notification_id: id,
            }),
        );
        Ok(())
    }

    /// Read/unread counters per type and overall.
    pub async fn stats(&self, user_id: UserId) -> Result<NotificationStats, RelayError> {
        let all = self.store.notifications_for_user(user_id).await?;
        Ok(NotificationStats::tally(&all))
    }

    async fn record_source(&self, user_id: UserId, device_id: &str) -> Result<(), RelayError> {
        let descriptor = DeviceDescriptor {
            device_id: device_id.to_string(),
            kind: DeviceKind::Mobile,
            name: device_id.to_string(),
        };
        self.devices.upsert(user_id, &descriptor).await?;
        self.devices.touch(device_id).await
    }
}

fn parse_kind(raw: Option<&str>) -> Result<Option<NotificationType>, RelayError> {
    match raw {
        None | Some("") | Some("all") => Ok(None),
        Some(name) => name.parse().map(Some),
    }
}

fn notification_not_found() -> RelayError {
    RelayError::not_found("Notification not found")
}
