//! Infrastructure layer for relay-server.
//!
//! The infrastructure layer handles all I/O and everything framework-shaped:
//!
//! - `storage`: the [`storage::Store`] trait and the in-memory store
//! - `config`: TOML configuration file loading and validation
//! - `ws_server`: the real-time WebSocket channel (tokio-tungstenite)
//! - `http_api`: the REST API (axum)
//! - `auth`: password hashing and bearer tokens
//! - `qr`: pairing-code rendering
//!
//! # What does NOT belong here?
//!
//! - Pairing or delivery rules (that is the application layer)
//! - Wire message definitions (those live in `relay-core`)

pub mod auth;
pub mod config;
pub mod http_api;
pub mod qr;
pub mod storage;
pub mod ws_server;

// Re-export the primary entry points so `main.rs` can call them concisely.
pub use http_api::run_http;
pub use ws_server::run_server;
