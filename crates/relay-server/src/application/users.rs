//! UserService: registration, login, profile and delivery preferences.

use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use relay_core::domain::user::{normalize_email, validate_password};
use relay_core::{
    Clock, NotificationPreferences, PreferencesPatch, RelayError, User, UserId, UserProfile,
};

use crate::infrastructure::auth::{hash_password, verify_password, TokenIssuer};
use crate::infrastructure::storage::Store;

/// A profile together with a freshly issued bearer token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub profile: UserProfile,
    pub token: String,
}

/// Partial profile update; `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
}

#[derive(Clone)]
pub struct UserService {
    store: Arc<dyn Store>,
    tokens: TokenIssuer,
    clock: Arc<dyn Clock>,
}

impl UserService {
    pub fn new(store: Arc<dyn Store>, tokens: TokenIssuer, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            tokens,
            clock,
        }
    }

    /// Creates an account and logs it in.
    ///
    /// # Errors
    ///
    /// [`RelayError::Validation`] for a missing name, malformed email or
    /// short password; [`RelayError::EmailInUse`] for a taken address.
    pub async fn register(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<Credentials, RelayError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(RelayError::validation("Please provide a name"));
        }
        let email = normalize_email(email)?;
        validate_password(password)?;

        let user = User {
            id: Uuid::new_v4(),
            name: name.to_string(),
            email,
            password_hash: hash_password(password)?,
            notification_settings: NotificationPreferences::default(),
            created_at: self.clock.now(),
        };
        self.store.insert_user(user.clone()).await?;
        info!(user = %user.id, "account registered");
        self.credentials(&user)
    }

    /// Checks credentials and issues a token.
    ///
    /// # Errors
    ///
    /// [`RelayError::Unauthorized`] for an unknown email or wrong password.
    pub async fn login(&self, email: &str, password: &str) -> Result<Credentials, RelayError> {
        let invalid = || RelayError::unauthorized("Invalid email or password");
        let email = normalize_email(email).map_err(|_| invalid())?;
        let user = self.store.user_by_email(&email).await?.ok_or_else(invalid)?;
        if !verify_password(password, &user.password_hash)? {
            return Err(invalid());
        }
        self.credentials(&user)
    }

    /// Resolves a bearer token to the user it was issued for.
    ///
    /// # Errors
    ///
    /// [`RelayError::Unauthorized`] for an invalid token or a deleted user.
    pub async fn authenticate(&self, token: &str) -> Result<UserId, RelayError> {
        let user_id = self.tokens.verify(token)?;
        match self.store.user(user_id).await? {
            Some(_) => Ok(user_id),
            None => Err(RelayError::unauthorized("Not authorized, user not found")),
        }
    }

    pub async fn profile(&self, user_id: UserId) -> Result<UserProfile, RelayError> {
        Ok(UserProfile::from(&self.load(user_id).await?))
    }

    /// Merges a partial preferences update and returns the result.
    pub async fn update_notification_settings(
        &self,
        user_id: UserId,
        patch: PreferencesPatch,
    ) -> Result<NotificationPreferences, RelayError> {
        let mut user = self.load(user_id).await?;
        user.notification_settings.apply(patch);
        let settings = user.notification_settings.clone();
        self.store.update_user(user).await?;
        Ok(settings)
    }

    /// Changes name and/or email.
    ///
    /// # Errors
    ///
    /// [`RelayError::Validation`] for a blank name or malformed email;
    /// [`RelayError::EmailInUse`] if the email belongs to another account.
    pub async fn update_profile(
        &self,
        user_id: UserId,
        update: ProfileUpdate,
    ) -> Result<UserProfile, RelayError> {
        let mut user = self.load(user_id).await?;
        if let Some(name) = update.name {
            let name = name.trim();
            if name.is_empty() {
                return Err(RelayError::validation("Please provide a name"));
            }
            user.name = name.to_string();
        }
        if let Some(email) = update.email {
            user.email = normalize_email(&email)?;
        }
        let profile = UserProfile::from(&user);
        self.store.update_user(user).await?;
        Ok(profile)
    }

    /// Replaces the password after checking the current one.
    ///
    /// # Errors
    ///
    /// [`RelayError::Validation`] if either password is missing or the new
    /// one is too short; [`RelayError::Unauthorized`] if `current` is wrong.
    pub async fn change_password(
        &self,
        user_id: UserId,
        current: &str,
        new: &str,
    ) -> Result<(), RelayError> {
        if current.is_empty() || new.is_empty() {
            return Err(RelayError::validation(
                "Please provide current and new password",
            ));
        }
        validate_password(new)?;

        let mut user = self.load(user_id).await?;
        if !verify_password(current, &user.password_hash)? {
            return Err(RelayError::unauthorized("Current password is incorrect"));
        }
        user.password_hash = hash_password(new)?;
        self.store.update_user(user).await?;
        info!(user = %user_id, "password changed");
        Ok(())
    }

    async fn load(&self, user_id: UserId) -> Result<User, RelayError> {
        self.store
            .user(user_id)
            .await?
            .ok_or_else(|| RelayError::not_found("User not found"))
    }

    fn credentials(&self, user: &User) -> Result<Credentials, RelayError> {
        Ok(Credentials {
            profile: UserProfile::from(user),
            token: self.tokens.issue(user.id, self.clock.now())?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::storage::MemoryStore;
    use chrono::Duration;
    use relay_core::SystemClock;
    use std::collections::BTreeMap;

    fn make_service() -> UserService {
        UserService::new(
            Arc::new(MemoryStore::new()),
            TokenIssuer::new("test-secret", Duration::days(30)),
            Arc::new(SystemClock),
        )
    }

    #[tokio::test]
    async fn test_register_then_login_issues_valid_tokens() {
        // Arrange
        let users = make_service();

        // Act
        let registered = users
            .register("Alice", "Alice@Example.com", "hunter22")
            .await
            .unwrap();
        let logged_in = users.login("alice@example.com", "hunter22").await.unwrap();

        // Assert
        assert_eq!(registered.profile.email, "alice@example.com");
        assert_eq!(logged_in.profile.id, registered.profile.id);
        assert_eq!(
            users.authenticate(&logged_in.token).await.unwrap(),
            registered.profile.id
        );
    }

    #[tokio::test]
    async fn test_register_rejects_duplicate_email_and_short_password() {
        let users = make_service();
        users.register("Alice", "a@x.io", "hunter22").await.unwrap();

        assert_eq!(
            users.register("Eve", "A@X.io", "hunter22").await,
            Err(RelayError::EmailInUse)
        );
        assert!(matches!(
            users.register("Bob", "b@x.io", "123").await,
            Err(RelayError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_login_with_wrong_password_is_unauthorized() {
        let users = make_service();
        users.register("Alice", "a@x.io", "hunter22").await.unwrap();

        assert!(matches!(
            users.login("a@x.io", "hunter23").await,
            Err(RelayError::Unauthorized(_))
        ));
        assert!(matches!(
            users.login("nobody@x.io", "hunter22").await,
            Err(RelayError::Unauthorized(_))
        ));
    }

    #[tokio::test]
    async fn test_update_settings_is_a_partial_merge() {
        // Arrange
        let users = make_service();
        let id = users.register("Alice", "a@x.io", "hunter22").await.unwrap().profile.id;
        let mut apps = BTreeMap::new();
        apps.insert("slack".to_string(), false);

        // Act
        users
            .update_notification_settings(
                id,
                PreferencesPatch {
                    email: Some(false),
                    app_notifications: Some(apps),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let settings = users
            .update_notification_settings(
                id,
                PreferencesPatch {
                    calls: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        // Assert
        assert!(!settings.email);
        assert!(!settings.calls);
        assert!(settings.messages);
        assert!(!settings.app_enabled("slack"));
    }

    #[tokio::test]
    async fn test_update_profile_rejects_email_of_another_account() {
        let users = make_service();
        users.register("Alice", "a@x.io", "hunter22").await.unwrap();
        let bob = users.register("Bob", "b@x.io", "hunter22").await.unwrap().profile.id;

        let result = users
            .update_profile(
                bob,
                ProfileUpdate {
                    email: Some("a@x.io".to_string()),
                    ..Default::default()
                },
            )
            .await;

        assert_eq!(result, Err(RelayError::EmailInUse));
    }

    #[tokio::test]
    async fn test_update_profile_changes_name_only() {
        let users = make_service();
        let id = users.register("Alice", "a@x.io", "hunter22").await.unwrap().profile.id;

        let profile = users
            .update_profile(
                id,
                ProfileUpdate {
                    name: Some("Alice B".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(profile.name, "Alice B");
        assert_eq!(profile.email, "a@x.io");
    }

    #[tokio::test]
    async fn test_change_password_requires_current_password() {
        // Arrange
        let users = make_service();
        let id = users.register("Alice", "a@x.io", "hunter22").await.unwrap().profile.id;

        // Act / Assert
        assert!(matches!(
            users.change_password(id, "wrong-one", "newpass1").await,
            Err(RelayError::Unauthorized(_))
        ));
        assert!(matches!(
            users.change_password(id, "hunter22", "short").await,
            Err(RelayError::Validation(_))
        ));
        users.change_password(id, "hunter22", "newpass1").await.unwrap();
        assert!(users.login("a@x.io", "newpass1").await.is_ok());
        assert!(users.login("a@x.io", "hunter22").await.is_err());
    }
}
