//! TCP protocol server

pub mod connection;
pub mod listener;

pub use connection::{serve, CloseReason, ConnectionContext, ConnectionState, ConnectionSummary};
pub use listener::{Listener, ListenerConfig, ListenerStats, ListenerStatsSnapshot};
