//! Application layer for the relay client.
//!
//! Both modules are plain data structures with no I/O, so they are tested
//! without a socket.
//!
//! - **`history`** – Newest-first ring buffer of received notifications with
//!   local read state, kept in sync with `notification_update` events.
//!
//! - **`subscriptions`** – `on(event, handler)` / `off(id)` registry that the
//!   connection calls for every frame.

pub mod history;
pub mod subscriptions;
