//! Switchboard - line-delimited JSON command server
//!
//! Clients hold a persistent TCP connection and exchange one JSON object per
//! line. Each request names a command; the registry routes it to a handler,
//! which may require a session opened through the AUTH command. Browsers
//! reach the same server through a WebSocket bridge.
//!
//! ## Components
//!
//! - **protocol**: newline-delimited JSON framing
//! - **session**: session ids with idle expiry
//! - **registry**: command type to handler mapping and dispatch
//! - **server**: TCP listener, bounded worker pool, per-connection loop
//! - **bridge**: WebSocket to TCP relay plus `/health`
//! - **handlers**: built-in AUTH and PROFILE commands

pub mod auth;
pub mod bridge;
pub mod client;
pub mod config;
pub mod handlers;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod session;
pub mod shutdown;
pub mod types;

pub use config::Args;
pub use types::{Result, SwitchboardError};
