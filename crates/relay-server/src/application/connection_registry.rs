//! ConnectionRegistry: which live real-time connections belong to which user.
//!
//! Every WebSocket connection that has sent a valid `authenticate` message is
//! registered here under its user id.  The pairing, device and notification
//! use cases push events through [`ConnectionRegistry::fan_out`], which
//! delivers to every connection of that user.
//!
//! # Handles (for beginners)
//!
//! A [`ConnectionHandle`] does not own the socket.  It holds the sending half
//! of an unbounded `mpsc` channel; the task that owns the socket drains the
//! receiving half and writes frames.  Sending on an unbounded channel never
//! waits, so a fan-out completes in bounded time no matter how slow a client
//! is.  When the socket task exits, the receiver is dropped and the next
//! send fails: that is how the registry notices a closed handle and prunes it.
//!
//! # Sharding
//!
//! `DashMap` splits the map into independently locked shards, so fan-outs
//! for different users do not contend.  No shard guard is ever held across a
//! channel send or across a lookup in the other map.

use std::collections::HashMap;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, trace};
use uuid::Uuid;

use relay_core::{ServerEvent, UserId};

/// Identifies one live connection for its whole lifetime.
pub type ConnectionId = Uuid;

/// Sending side of one live connection.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    device_id: Option<String>,
    sender: mpsc::UnboundedSender<ServerEvent>,
}

impl ConnectionHandle {
    pub fn new(
        id: ConnectionId,
        device_id: Option<String>,
        sender: mpsc::UnboundedSender<ServerEvent>,
    ) -> Self {
        Self {
            id,
            device_id,
            sender,
        }
    }

    /// Creates a handle with a fresh id and returns the receiving half.
    pub fn channel(device_id: Option<String>) -> (Self, mpsc::UnboundedReceiver<ServerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(Uuid::new_v4(), device_id, tx), rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn device_id(&self) -> Option<&str> {
        self.device_id.as_deref()
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    fn send(&self, event: ServerEvent) -> bool {
        self.sender.send(event).is_ok()
    }
}

/// Process-local map of user id → live connections.
#[derive(Default)]
pub struct ConnectionRegistry {
    by_user: DashMap<UserId, HashMap<ConnectionId, ConnectionHandle>>,
    /// Reverse index so a handle is never registered under two users.
    owners: DashMap<ConnectionId, UserId>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handle` for `user_id`.
    ///
    /// Idempotent for the same handle.  A handle previously registered under
    /// a different user is moved: its old association is removed first.
    pub fn register(&self, user_id: UserId, handle: ConnectionHandle) {
        let id = handle.id;
        if let Some(previous) = self.owners.insert(id, user_id) {
            if previous != user_id {
                debug!(connection = %id, from = %previous, to = %user_id, "re-registering connection");
                self.remove_from_user(previous, id);
            }
        }
        self.by_user.entry(user_id).or_default().insert(id, handle);
        trace!(user = %user_id, connection = %id, "connection registered");
    }

    /// Removes the connection `id` from `user_id`.  Prunes the user entry when
    /// its last connection leaves.
    pub fn unregister(&self, user_id: UserId, id: ConnectionId) {
        self.remove_from_user(user_id, id);
        self.owners.remove_if(&id, |_, owner| *owner == user_id);
        trace!(user = %user_id, connection = %id, "connection unregistered");
    }

    /// Delivers `event` to every connection of `user_id`.
    ///
    /// Best-effort: closed handles are pruned without affecting siblings.  A
    /// user with no connections is a no-op.  Returns the number of
    /// connections the event was handed to.
    pub fn fan_out(&self, user_id: UserId, event: &ServerEvent) -> usize {
        self.deliver(user_id, None, event)
    }

    /// Like [`fan_out`](Self::fan_out) but skips the connection `except`.
    pub fn fan_out_except(&self, user_id: UserId, except: ConnectionId, event: &ServerEvent) -> usize {
        self.deliver(user_id, Some(except), event)
    }

    /// `true` if at least one connection is registered for `user_id`.
    pub fn is_connected(&self, user_id: UserId) -> bool {
        self.connection_count(user_id) > 0
    }

    pub fn connection_count(&self, user_id: UserId) -> usize {
        self.by_user.get(&user_id).map_or(0, |set| set.len())
    }

    /// Total connections across every user.
    pub fn total_connections(&self) -> usize {
        self.owners.len()
    }

    /// Which user (if any) `id` is registered under.
    pub fn owner_of(&self, id: ConnectionId) -> Option<UserId> {
        self.owners.get(&id).map(|entry| *entry.value())
    }

    fn deliver(&self, user_id: UserId, except: Option<ConnectionId>, event: &ServerEvent) -> usize {
        // Snapshot so no shard guard is held while sending.
        let handles: Vec<ConnectionHandle> = match self.by_user.get(&user_id) {
            Some(set) => set
                .values()
                .filter(|h| Some(h.id) != except)
                .cloned()
                .collect(),
            None => return 0,
        };

        let mut delivered = 0;
        let mut closed = Vec::new();
        for handle in handles {
            if handle.send(event.clone()) {
                delivered += 1;
            } else {
                closed.push(handle.id);
            }
        }

        for id in closed {
            debug!(user = %user_id, connection = %id, "pruning closed connection");
            self.unregister(user_id, id);
        }

        trace!(user = %user_id, event = event.name(), delivered, "fan-out");
        delivered
    }

    fn remove_from_user(&self, user_id: UserId, id: ConnectionId) {
        let now_empty = match self.by_user.get_mut(&user_id) {
            Some(mut set) => {
                set.remove(&id);
                set.is_empty()
            }
            None => false,
        };
        if now_empty {
            self.by_user.remove_if(&user_id, |_, set| set.is_empty());
        }
    }
}
