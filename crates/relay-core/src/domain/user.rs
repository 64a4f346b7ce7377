//! User accounts and notification delivery preferences.
//!
//! # Delivery filter (for beginners)
//!
//! Every user carries three global toggles (`email`, `calls`, `messages`)
//! and a map of per-app toggles.  When the phone reports a notification the
//! relay asks [`NotificationPreferences::decide`] whether to keep it:
//!
//! ```text
//! type == app  && app map says false  ──►  Blocked(AppDisabled)
//! type == email && !email             ──►  Blocked(CategoryDisabled)
//! type == call  && !calls             ──►  Blocked(CategoryDisabled)
//! type == message && !messages        ──►  Blocked(CategoryDisabled)
//! otherwise                           ──►  Deliver
//! ```
//!
//! An app that is absent from the map counts as enabled, and `app`
//! notifications have no global toggle of their own.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::notification::NotificationType;
use crate::error::RelayError;

/// Unique identifier of a user account.
pub type UserId = Uuid;

/// Minimum accepted password length.
pub const MIN_PASSWORD_LEN: usize = 6;

/// Per-user delivery toggles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPreferences {
    pub email: bool,
    pub calls: bool,
    pub messages: bool,
    /// App identifier → enabled.  A missing key means enabled.
    #[serde(default)]
    pub app_notifications: BTreeMap<String, bool>,
}

impl Default for NotificationPreferences {
    fn default() -> Self {
        Self {
            email: true,
            calls: true,
            messages: true,
            app_notifications: BTreeMap::new(),
        }
    }
}

/// Outcome of running a notification through the delivery filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryDecision {
    Deliver,
    /// The source app is explicitly disabled in the per-app map.
    AppDisabled(String),
    /// The global toggle for this notification class is off.
    CategoryDisabled(NotificationType),
}

impl DeliveryDecision {
    pub fn is_blocked(&self) -> bool {
        !matches!(self, Self::Deliver)
    }
}

impl NotificationPreferences {
    /// Returns `true` unless `app` is explicitly disabled.
    pub fn app_enabled(&self, app: &str) -> bool {
        self.app_notifications.get(app).copied().unwrap_or(true)
    }

    /// Applies the delivery filter.  The per-app rule is checked first.
    pub fn decide(&self, kind: NotificationType, source_app: Option<&str>) -> DeliveryDecision {
        if kind == NotificationType::App {
            if let Some(app) = source_app {
                if !self.app_enabled(app) {
                    return DeliveryDecision::AppDisabled(app.to_string());
                }
            }
        }

        let class_enabled = match kind {
            NotificationType::Email => self.email,
            NotificationType::Call => self.calls,
            NotificationType::Message => self.messages,
            NotificationType::App => true,
        };

        if class_enabled {
            DeliveryDecision::Deliver
        } else {
            DeliveryDecision::CategoryDisabled(kind)
        }
    }

    /// Merges a partial update.  App toggles are merged key by key so that
    /// setting one app never resets the others.
    pub fn apply(&mut self, patch: PreferencesPatch) {
        if let Some(email) = patch.email {
            self.email = email;
        }
        if let Some(calls) = patch.calls {
            self.calls = calls;
        }
        if let Some(messages) = patch.messages {
            self.messages = messages;
        }
        if let Some(apps) = patch.app_notifications {
            self.app_notifications.extend(apps);
        }
    }
}

/// Partial update of [`NotificationPreferences`]; `None` leaves a field as is.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreferencesPatch {
    #[serde(default)]
    pub email: Option<bool>,
    #[serde(default)]
    pub calls: Option<bool>,
    #[serde(default)]
    pub messages: Option<bool>,
    #[serde(default)]
    pub app_notifications: Option<BTreeMap<String, bool>>,
}

/// A stored user account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub name: String,
    /// Always stored trimmed and lower-cased; unique across accounts.
    pub email: String,
    /// PHC-formatted Argon2 hash.  Never serialized.
    pub password_hash: String,
    pub notification_settings: NotificationPreferences,
    pub created_at: DateTime<Utc>,
}

/// The client-facing view of a [`User`] (no credential material).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub notification_settings: NotificationPreferences,
    pub created_at: DateTime<Utc>,
}

impl From<&User> for UserProfile {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            email: user.email.clone(),
            notification_settings: user.notification_settings.clone(),
            created_at: user.created_at,
        }
    }
}

/// Trims, lower-cases and sanity-checks an email address.
///
/// # Errors
///
/// Returns [`RelayError::Validation`] if the address has no local part, no
/// `@`, or a domain without a dot.
pub fn normalize_email(raw: &str) -> Result<String, RelayError> {
    let email = raw.trim().to_lowercase();
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && domain.contains('.')
                && !domain.contains('@')
                && !email.contains(char::is_whitespace)
        }
        None => false,
    };

    if valid {
        Ok(email)
    } else {
        Err(RelayError::validation("Please provide a valid email"))
    }
}

/// Checks the minimum password length.
///
/// # Errors
///
/// Returns [`RelayError::Validation`] for passwords shorter than
/// [`MIN_PASSWORD_LEN`] characters.
pub fn validate_password(password: &str) -> Result<(), RelayError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(RelayError::validation(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prefs_with_app(app: &str, enabled: bool) -> NotificationPreferences {
        let mut prefs = NotificationPreferences::default();
        prefs.app_notifications.insert(app.to_string(), enabled);
        prefs
    }

    #[test]
    fn test_default_preferences_deliver_every_type() {
        let prefs = NotificationPreferences::default();
        for kind in NotificationType::ALL {
            assert_eq!(prefs.decide(kind, Some("slack")), DeliveryDecision::Deliver);
        }
    }

    #[test]
    fn test_disabled_email_blocks_email_only() {
        // Arrange
        let prefs = NotificationPreferences {
            email: false,
            ..Default::default()
        };

        // Act / Assert
        assert_eq!(
            prefs.decide(NotificationType::Email, None),
            DeliveryDecision::CategoryDisabled(NotificationType::Email)
        );
        assert_eq!(
            prefs.decide(NotificationType::Message, None),
            DeliveryDecision::Deliver
        );
    }

    #[test]
    fn test_disabled_calls_and_messages_map_to_their_types() {
        let prefs = NotificationPreferences {
            calls: false,
            messages: false,
            ..Default::default()
        };
        assert!(prefs.decide(NotificationType::Call, None).is_blocked());
        assert!(prefs.decide(NotificationType::Message, None).is_blocked());
        assert!(!prefs.decide(NotificationType::Email, None).is_blocked());
    }

    #[test]
    fn test_disabled_app_blocks_app_notification_from_that_app() {
        let prefs = prefs_with_app("slack", false);
        assert_eq!(
            prefs.decide(NotificationType::App, Some("slack")),
            DeliveryDecision::AppDisabled("slack".to_string())
        );
        assert_eq!(
            prefs.decide(NotificationType::App, Some("teams")),
            DeliveryDecision::Deliver
        );
    }

    #[test]
    fn test_app_map_does_not_gate_non_app_types() {
        // A "message" from a disabled app is still a message: only the
        // global messages toggle applies.
        let prefs = prefs_with_app("whatsapp", false);
        assert_eq!(
            prefs.decide(NotificationType::Message, Some("whatsapp")),
            DeliveryDecision::Deliver
        );
    }

    #[test]
    fn test_app_rule_wins_over_category_rule() {
        let mut prefs = prefs_with_app("gmail", false);
        prefs.email = false;
        assert_eq!(
            prefs.decide(NotificationType::App, Some("gmail")),
            DeliveryDecision::AppDisabled("gmail".to_string())
        );
    }

    #[test]
    fn test_apply_patch_merges_app_map() {
        // Arrange
        let mut prefs = prefs_with_app("slack", false);
        let mut apps = BTreeMap::new();
        apps.insert("teams".to_string(), false);
        let patch = PreferencesPatch {
            calls: Some(false),
            app_notifications: Some(apps),
            ..Default::default()
        };

        // Act
        prefs.apply(patch);

        // Assert
        assert!(prefs.email);
        assert!(!prefs.calls);
        assert!(!prefs.app_enabled("slack"));
        assert!(!prefs.app_enabled("teams"));
        assert!(prefs.app_enabled("zoom"));
    }

    #[test]
    fn test_preferences_serialize_in_camel_case() {
        let json = serde_json::to_value(NotificationPreferences::default()).unwrap();
        assert_eq!(json["email"], true);
        assert!(json.get("appNotifications").is_some());
    }

    #[test]
    fn test_normalize_email_lowercases_and_trims() {
        assert_eq!(
            normalize_email("  Alice@Example.COM ").unwrap(),
            "alice@example.com"
        );
    }

    #[test]
    fn test_normalize_email_rejects_malformed_addresses() {
        for bad in ["", "alice", "@example.com", "alice@", "alice@localhost", "a b@x.io"] {
            assert!(
                matches!(normalize_email(bad), Err(RelayError::Validation(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_validate_password_enforces_minimum_length() {
        assert!(validate_password("12345").is_err());
        assert!(validate_password("123456").is_ok());
    }
}
