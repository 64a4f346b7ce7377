//! DeviceRegistry: known devices per user and their connected status.
//!
//! Devices are created lazily (first pairing attempt, first notification
//! reported from them) and deleted only when their owner asks.  Deleting a
//! device also ends every session it takes part in, so the other end of the
//! pairing is told the connection is gone.

use std::sync::Arc;

use tracing::{debug, info, warn};

use relay_core::{
    Clock, Device, DeviceDescriptor, PairingSession, RelayError, ServerEvent, SessionState,
    SessionUpdate, TerminationCause, UserId,
};

use super::connection_registry::ConnectionRegistry;
use crate::infrastructure::storage::Store;

/// Use case for everything device-shaped.
#[derive(Clone)]
pub struct DeviceRegistry {
    store: Arc<dyn Store>,
    connections: Arc<ConnectionRegistry>,
    clock: Arc<dyn Clock>,
}

impl DeviceRegistry {
    pub fn new(
        store: Arc<dyn Store>,
        connections: Arc<ConnectionRegistry>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            connections,
            clock,
        }
    }

    /// Returns the device if `user_id` owns it, creating it if unknown.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::DeviceConflict`] if the identifier is registered
    /// to another user.
    pub async fn upsert(
        &self,
        user_id: UserId,
        descriptor: &DeviceDescriptor,
    ) -> Result<Device, RelayError> {
        let candidate = Device::new(user_id, descriptor, self.clock.now());
        let stored = self.store.insert_device_if_absent(candidate).await?;
        if stored.user_id != user_id {
            warn!(device = %descriptor.device_id, "device identifier claimed by another account");
            return Err(RelayError::DeviceConflict {
                device_id: descriptor.device_id.clone(),
            });
        }
        Ok(stored)
    }

    /// Updates the connected flag and `last_active`.
    ///
    /// A device that no longer exists is skipped; this is called while
    /// tearing down sessions whose devices may already be gone.
    pub async fn set_connected(&self, device_id: &str, connected: bool) -> Result<(), RelayError> {
        let updated = self
            .store
            .set_device_connected(device_id, connected, self.clock.now())
            .await?;
        if updated.is_none() {
            debug!(device = %device_id, "set_connected on unknown device ignored");
        }
        Ok(())
    }

    /// Bumps `last_active`.  Unknown devices are ignored.
    pub async fn touch(&self, device_id: &str) -> Result<(), RelayError> {
        self.store.touch_device(device_id, self.clock.now()).await
    }

    /// Renames a device owned by `user_id`.
    ///
    /// # Errors
    ///
    /// [`RelayError::Validation`] for an empty name, [`RelayError::NotFound`]
    /// if the device is missing or owned by someone else.
    pub async fn rename(
        &self,
        user_id: UserId,
        device_id: &str,
        name: &str,
    ) -> Result<Device, RelayError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(RelayError::validation("Device name is required"));
        }
        self.owned(user_id, device_id).await?;
        self.store
            .rename_device(device_id, name.to_string())
            .await?
            .ok_or_else(device_not_found)
    }

    /// Deletes a device owned by `user_id`, ending every live session that
    /// references it first.
    ///
    /// # Errors
    ///
    /// [`RelayError::NotFound`] if the device is missing or not owned.
    pub async fn remove(&self, user_id: UserId, device_id: &str) -> Result<(), RelayError> {
        self.owned(user_id, device_id).await?;

        let now = self.clock.now();
        for session in self.store.live_sessions_for_device(device_id).await? {
            if let Some(ended) = self
                .store
                .terminate_session(&session.token, TerminationCause::DeviceRemoved, now)
                .await?
            {
                self.release_session(&ended).await?;
            }
        }

        self.store.delete_device(device_id).await?;
        info!(user = %user_id, device = %device_id, "device removed");
        Ok(())
    }

    /// Lists the user's devices.  `is_connected` is the stored flag OR
    /// participation in any `Active` session.
    pub async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Device>, RelayError> {
        let active: Vec<PairingSession> = self
            .store
            .live_sessions_for_user(user_id)
            .await?
            .into_iter()
            .filter(|s| s.state == SessionState::Active)
            .collect();

        let mut devices = self.store.devices_for_user(user_id).await?;
        for device in &mut devices {
            device.is_connected =
                device.is_connected || active.iter().any(|s| s.involves(&device.device_id));
        }
        Ok(devices)
    }

    /// Side effects of a session that has just been terminated: both ends
    /// are marked disconnected and the user's connections are told.
    ///
    /// Only the caller that actually performed the transition may call this.
    pub(crate) async fn release_session(&self, session: &PairingSession) -> Result<(), RelayError> {
        for device_id in session.participants() {
            self.set_connected(&device_id, false).await?;
        }
        let event = ServerEvent::SessionUpdate(SessionUpdate::ConnectionTerminated {
            session_id: session.token.clone(),
        });
        self.connections.fan_out(session.user_id, &event);
        info!(user = %session.user_id, session = %session.token, "pairing session terminated");
        Ok(())
    }

    async fn owned(&self, user_id: UserId, device_id: &str) -> Result<Device, RelayError> {
        match self.store.device(device_id).await? {
            Some(device) if device.user_id == user_id => Ok(device),
            _ => Err(device_not_found()),
        }
    }
}

fn device_not_found() -> RelayError {
    RelayError::not_found("Device not found")
}
