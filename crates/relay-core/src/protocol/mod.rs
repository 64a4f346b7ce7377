//! Real-time channel protocol.
//!
//! All WebSocket frames are JSON text frames shaped as
//! `{"event": <name>, "data": <payload>}`.  See [`events`].

pub mod events;
