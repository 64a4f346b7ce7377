//! Credential hashing and bearer tokens.
//!
//! - Passwords are hashed with Argon2id and stored in PHC string format
//!   (salt and parameters travel inside the string).
//! - Bearer tokens are HS256 JWTs whose subject is the user id.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use relay_core::{RelayError, UserId};

/// Hashes `password` with Argon2id.
///
/// # Errors
///
/// [`RelayError::Storage`] if the hasher fails (it does not for valid input).
pub fn hash_password(password: &str) -> Result<String, RelayError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| RelayError::Storage(format!("failed to hash password: {e}")))
}

/// Returns `true` if `password` matches the PHC-formatted `hash`.
///
/// # Errors
///
/// [`RelayError::Storage`] if the stored hash is not valid PHC text.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, RelayError> {
    let parsed = PasswordHash::new(hash)
        .map_err(|e| RelayError::Storage(format!("invalid password hash format: {e}")))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

/// Payload stored in a bearer token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id.
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
}

/// Issues and validates bearer tokens.
#[derive(Clone)]
pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl TokenIssuer {
    pub fn new(secret: &str, ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl,
        }
    }

    /// Issues a token for `user_id`, valid for the configured TTL from `now`.
    ///
    /// # Errors
    ///
    /// [`RelayError::Storage`] if signing fails.
    pub fn issue(&self, user_id: UserId, now: DateTime<Utc>) -> Result<String, RelayError> {
        let claims = Claims {
            sub: user_id.to_string(),
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };
        encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| RelayError::Storage(format!("failed to sign token: {e}")))
    }

    /// Validates `token` and returns the user id it was issued for.
    ///
    /// # Errors
    ///
    /// [`RelayError::Unauthorized`] for a malformed, forged or expired token.
    pub fn verify(&self, token: &str) -> Result<UserId, RelayError> {
        let data = decode::<Claims>(token, &self.decoding, &Validation::default()).map_err(|e| {
            use jsonwebtoken::errors::ErrorKind;
            let reason = match e.kind() {
                ErrorKind::ExpiredSignature => "Not authorized, token expired",
                _ => "Not authorized, token failed",
            };
            RelayError::unauthorized(reason)
        })?;
        Uuid::parse_str(&data.claims.sub)
            .map_err(|_| RelayError::unauthorized("Not authorized, token failed"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_password("correct-horse").unwrap();

        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("correct-horse", &hash).unwrap());
        assert!(!verify_password("wrong-horse", &hash).unwrap());
    }

    #[test]
    fn test_same_password_hashes_differently() {
        let a = hash_password("same").unwrap();
        let b = hash_password("same").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_verify_rejects_malformed_hash() {
        assert!(matches!(
            verify_password("x", "not-a-phc-string"),
            Err(RelayError::Storage(_))
        ));
    }

    #[test]
    fn test_token_round_trip_yields_user_id() {
        // Arrange
        let issuer = TokenIssuer::new("test-secret", Duration::days(30));
        let user = Uuid::new_v4();

        // Act
        let token = issuer.issue(user, Utc::now()).unwrap();

        // Assert
        assert_eq!(issuer.verify(&token).unwrap(), user);
    }

    #[test]
    fn test_expired_token_is_unauthorized() {
        let issuer = TokenIssuer::new("test-secret", Duration::days(1));
        let token = issuer
            .issue(Uuid::new_v4(), Utc::now() - Duration::days(3))
            .unwrap();

        assert_eq!(
            issuer.verify(&token),
            Err(RelayError::unauthorized("Not authorized, token expired"))
        );
    }

    #[test]
    fn test_token_signed_with_other_secret_is_unauthorized() {
        let ours = TokenIssuer::new("ours", Duration::days(1));
        let theirs = TokenIssuer::new("theirs", Duration::days(1));
        let token = theirs.issue(Uuid::new_v4(), Utc::now()).unwrap();

        assert!(matches!(ours.verify(&token), Err(RelayError::Unauthorized(_))));
    }
}
