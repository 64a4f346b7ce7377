//! Domain layer: pure entities and business rules with no I/O.
//!
//! - [`user`]: accounts and per-user delivery preferences.
//! - [`device`]: known devices and their connected flag.
//! - [`session`]: the pairing-session state machine.
//! - [`notification`]: relayed notifications, listing queries, read stats.

pub mod device;
pub mod notification;
pub mod session;
pub mod user;
