//! Devices known to the relay.
//!
//! A device is identified by a stable, client-generated identifier (the
//! phone or browser makes one up on first launch and keeps it).  The relay
//! creates the record lazily the first time the identifier shows up in a
//! pairing request or as the source of a notification; it is only ever
//! deleted explicitly by its owner.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::user::UserId;
use crate::error::RelayError;

/// Hardware category reported by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    Mobile,
    Laptop,
    Desktop,
    Tablet,
    Other,
}

impl DeviceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mobile => "mobile",
            Self::Laptop => "laptop",
            Self::Desktop => "desktop",
            Self::Tablet => "tablet",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceKind {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mobile" => Ok(Self::Mobile),
            "laptop" => Ok(Self::Laptop),
            "desktop" => Ok(Self::Desktop),
            "tablet" => Ok(Self::Tablet),
            "other" => Ok(Self::Other),
            other => Err(RelayError::validation(format!(
                "Unknown device type '{other}'"
            ))),
        }
    }
}

/// What a client tells the relay about itself when it pairs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    pub device_id: String,
    pub kind: DeviceKind,
    pub name: String,
}

impl DeviceDescriptor {
    /// Builds a descriptor from raw request fields.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Validation`] for an empty identifier or name, or
    /// an unknown device type.
    pub fn parse(device_id: &str, kind: &str, name: &str) -> Result<Self, RelayError> {
        let device_id = device_id.trim();
        if device_id.is_empty() {
            return Err(RelayError::validation("Device ID is required"));
        }
        let name = name.trim();
        if name.is_empty() {
            return Err(RelayError::validation("Device name is required"));
        }
        Ok(Self {
            device_id: device_id.to_string(),
            kind: kind.parse()?,
            name: name.to_string(),
        })
    }
}

/// A stored device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    /// Stable client-generated identifier; globally unique and immutable.
    pub device_id: String,
    pub user_id: UserId,
    #[serde(rename = "deviceType")]
    pub kind: DeviceKind,
    #[serde(rename = "deviceName")]
    pub name: String,
    pub is_connected: bool,
    pub last_active: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Device {
    /// Creates a new, disconnected device record owned by `user_id`.
    pub fn new(user_id: UserId, descriptor: &DeviceDescriptor, now: DateTime<Utc>) -> Self {
        Self {
            device_id: descriptor.device_id.clone(),
            user_id,
            kind: descriptor.kind,
            name: descriptor.name.clone(),
            is_connected: false,
            last_active: now,
            created_at: now,
        }
    }
}
