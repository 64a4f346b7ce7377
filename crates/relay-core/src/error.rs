//! The error taxonomy shared by every Notify-Relay use case.
//!
//! Each variant maps to exactly one outcome a caller can act on.  The HTTP
//! layer in `relay-server` translates them into status codes via
//! [`RelayError::kind`]; nothing else in the workspace needs to match on the
//! individual variants.
//!
//! A notification blocked by the user's settings is **not** an error.  It is
//! a successful submission that reports `delivered = false`.

use thiserror::Error;

/// Coarse classification of a [`RelayError`], used for status mapping and
/// structured logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Unauthorized,
    NotFound,
    Conflict,
    Expired,
    AlreadyPaired,
    Storage,
}

/// Errors returned by the pairing, device, notification and user use cases.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RelayError {
    /// A request field is missing, malformed, or out of range.
    #[error("{0}")]
    Validation(String),

    /// Bad credentials or a missing/invalid bearer token.
    #[error("{0}")]
    Unauthorized(String),

    /// The entity does not exist, is owned by someone else, or (for pairing
    /// tokens) has already been terminated.  The message is user-facing.
    #[error("{0}")]
    NotFound(String),

    /// The stable device identifier is already registered to another user.
    #[error("device {device_id} is registered to another account")]
    DeviceConflict { device_id: String },

    /// Another user already owns this email address.
    #[error("Email is already in use")]
    EmailInUse,

    /// The pairing token is past its deadline.  The session has been
    /// terminated before this error is returned.
    #[error("QR code has expired")]
    Expired,

    /// The pairing session was already verified by another device.
    #[error("QR code has already been used to pair a device")]
    AlreadyPaired,

    /// The backing store failed.  The detail is logged, never sent to clients.
    #[error("storage failure: {0}")]
    Storage(String),
}

impl RelayError {
    /// Convenience constructor for [`RelayError::Validation`].
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Convenience constructor for [`RelayError::NotFound`].
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Convenience constructor for [`RelayError::Unauthorized`].
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized(message.into())
    }

    /// Returns the coarse [`ErrorKind`] of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::Unauthorized(_) => ErrorKind::Unauthorized,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::DeviceConflict { .. } | Self::EmailInUse => ErrorKind::Conflict,
            Self::Expired => ErrorKind::Expired,
            Self::AlreadyPaired => ErrorKind::AlreadyPaired,
            Self::Storage(_) => ErrorKind::Storage,
        }
    }
}
