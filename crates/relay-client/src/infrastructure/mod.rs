//! Infrastructure layer for the relay client.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `relay_core`, but MUST NOT be imported by the `application` layer.
//!
//! - **`connection`** – WebSocket client that authenticates, dispatches
//!   frames, and reconnects with a bounded number of attempts.

pub mod connection;
