//! Application layer for relay-server.
//!
//! The application layer holds the use cases.  Each one is a small `Clone`
//! struct that owns `Arc`s to the store, the clock and the connection
//! registry, so handlers and background tasks can hold their own copy.
//!
//! # Responsibilities
//!
//! - Tracking live real-time connections per user (`connection_registry`)
//! - The pairing-session state machine (`pairing`) and its sweeper
//! - Device bookkeeping (`devices`)
//! - Filtering, storing and fanning out notifications (`notifications`)
//! - Accounts, credentials and preferences (`users`)
//!
//! # What does NOT belong here?
//!
//! - Opening sockets or parsing HTTP (that is infrastructure)
//! - Tokio task spawning, except the sweeper's own loop

pub mod connection_registry;
pub mod devices;
pub mod notifications;
pub mod pairing;
pub mod sweeper;
pub mod users;
