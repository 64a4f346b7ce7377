//! Relayed notifications, listing queries, and read/unread statistics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::user::UserId;
use crate::error::RelayError;

/// Unique identifier of a stored notification.
pub type NotificationId = Uuid;

/// Class of a relayed notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationType {
    Email,
    Call,
    Message,
    App,
}

impl NotificationType {
    pub const ALL: [NotificationType; 4] = [Self::Email, Self::Call, Self::Message, Self::App];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Call => "call",
            Self::Message => "message",
            Self::App => "app",
        }
    }
}

impl fmt::Display for NotificationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationType {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "email" => Ok(Self::Email),
            "call" => Ok(Self::Call),
            "message" => Ok(Self::Message),
            "app" => Ok(Self::App),
            other => Err(RelayError::validation(format!(
                "Unknown notification type '{other}'"
            ))),
        }
    }
}

/// A stored notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: NotificationId,
    #[serde(rename = "user")]
    pub user_id: UserId,
    pub title: String,
    pub content: String,
    #[serde(rename = "type")]
    pub kind: NotificationType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_app: Option<String>,
    pub source_device_id: String,
    pub is_read: bool,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

/// Raw submission as received from the phone.
///
/// Every field is optional at the serde level so that a missing field turns
/// into a [`RelayError::Validation`] from [`NewNotification::into_notification`]
/// rather than a deserializer rejection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewNotification {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub source_app: Option<String>,
    #[serde(default)]
    pub source_device_id: Option<String>,
    #[serde(default)]
    pub action_url: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
}

fn required(field: Option<String>, name: &str) -> Result<String, RelayError> {
    match field {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(RelayError::validation(format!("{name} is required"))),
    }
}

fn non_blank(field: Option<String>) -> Option<String> {
    field.filter(|value| !value.trim().is_empty())
}

impl NewNotification {
    /// Validates the submission and turns it into an unread [`Notification`].
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Validation`] when `title`, `content`, `type` or
    /// `sourceDeviceId` is missing, or `type` is not a known class.
    pub fn into_notification(
        self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<Notification, RelayError> {
        let kind: NotificationType = required(self.kind, "Notification type")?.parse()?;
        Ok(Notification {
            id: Uuid::new_v4(),
            user_id,
            title: required(self.title, "Title")?,
            content: required(self.content, "Content")?,
            kind,
            source_app: non_blank(self.source_app),
            source_device_id: required(self.source_device_id, "Source device ID")?,
            is_read: false,
            timestamp: now,
            action_url: non_blank(self.action_url),
            icon: non_blank(self.icon),
        })
    }
}

/// Filters and paging for listing a user's notifications.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NotificationQuery {
    pub limit: usize,
    pub skip: usize,
    pub kind: Option<NotificationType>,
    pub is_read: Option<bool>,
}

impl NotificationQuery {
    /// `true` if `notification` passes the type and read-state filters.
    pub fn matches(&self, notification: &Notification) -> bool {
        self.kind.map_or(true, |kind| notification.kind == kind)
            && self.is_read.map_or(true, |read| notification.is_read == read)
    }
}

/// One page of a notification listing, newest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPage {
    /// Number of notifications in this page.
    pub count: usize,
    /// Number of notifications matching the filters across all pages.
    pub total: usize,
    pub notifications: Vec<Notification>,
}

/// Read/unread counters for one notification class (or all of them).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeCounts {
    pub read: usize,
    pub unread: usize,
    pub total: usize,
}

impl TypeCounts {
    fn record(&mut self, is_read: bool) {
        if is_read {
            self.read += 1;
        } else {
            self.unread += 1;
        }
        self.total += 1;
    }
}

/// Per-type and overall read statistics for one user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationStats {
    /// Only types with at least one notification appear here.
    pub by_type: BTreeMap<NotificationType, TypeCounts>,
    pub totals: TypeCounts,
}

impl NotificationStats {
    pub fn tally<'a>(notifications: impl IntoIterator<Item = &'a Notification>) -> Self {
        let mut stats = Self::default();
        for notification in notifications {
            stats
                .by_type
                .entry(notification.kind)
                .or_default()
                .record(notification.is_read);
            stats.totals.record(notification.is_read);
        }
        stats
    }
}
