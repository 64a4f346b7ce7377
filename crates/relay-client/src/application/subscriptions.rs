//! Event subscriptions for frames pushed by the relay.
//!
//! A subscriber registers a handler for one wire event name
//! (`"notification"`, `"session_update"`, …) and gets back an id it can later
//! pass to [`EventSubscriptions::off`].  Handlers registered for
//! [`ANY_EVENT`] see every event.
//!
//! Delivery is best-effort: a handler sees each frame the connection
//! receives, and nothing is replayed after a reconnect.

use std::sync::Arc;

use relay_core::ServerEvent;

/// Handler id returned by [`EventSubscriptions::on`].
pub type SubscriptionId = u64;

/// Event name that matches every event.
pub const ANY_EVENT: &str = "*";

/// A shared, thread-safe event handler.
pub type Handler = Arc<dyn Fn(&ServerEvent) + Send + Sync>;

/// Registry of event handlers keyed by event name.
#[derive(Default)]
pub struct EventSubscriptions {
    next_id: SubscriptionId,
    entries: Vec<Subscription>,
}

struct Subscription {
    id: SubscriptionId,
    event: String,
    handler: Handler,
}

impl EventSubscriptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `event` and returns its id.
    pub fn on<F>(&mut self, event: impl Into<String>, handler: F) -> SubscriptionId
    where
        F: Fn(&ServerEvent) + Send + Sync + 'static,
    {
        self.next_id += 1;
        let id = self.next_id;
        self.entries.push(Subscription {
            id,
            event: event.into(),
            handler: Arc::new(handler),
        });
        id
    }

    /// Removes a handler.  Returns `false` if the id was not registered.
    pub fn off(&mut self, id: SubscriptionId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|s| s.id != id);
        self.entries.len() != before
    }

    /// Returns the handlers that should see an event called `name`, in
    /// registration order.
    ///
    /// The connection task clones these out of its lock before calling them,
    /// so a handler may itself call `on` or `off` without deadlocking.
    pub fn matching(&self, name: &str) -> Vec<Handler> {
        self.entries
            .iter()
            .filter(|s| s.event == name || s.event == ANY_EVENT)
            .map(|s| Arc::clone(&s.handler))
            .collect()
    }

    /// Calls every matching handler and returns how many ran.
    pub fn emit(&self, event: &ServerEvent) -> usize {
        let handlers = self.matching(event.name());
        for handler in &handlers {
            handler(event);
        }
        handlers.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for EventSubscriptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSubscriptions")
            .field("handlers", &self.entries.len())
            .finish()
    }
}
