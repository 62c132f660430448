//! Configuration for switchboard
//!
//! CLI arguments with environment variable fallbacks, using clap.

use clap::{Parser, ValueEnum};
use std::net::SocketAddr;
use std::time::Duration;

/// Switchboard - line-delimited JSON command server
#[derive(Parser, Debug, Clone)]
#[command(name = "switchboard")]
#[command(about = "Line-delimited JSON command server with session auth and a WebSocket bridge")]
pub struct Args {
    /// Address the TCP protocol listener binds to
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:8888")]
    pub listen: SocketAddr,

    /// Maximum connections served concurrently; extra connections wait in queue
    #[arg(long, env = "WORKER_COUNT", default_value = "20")]
    pub worker_count: usize,

    /// Idle time after which a session expires, in milliseconds
    #[arg(long, env = "SESSION_TIMEOUT_MS", default_value = "3600000")]
    pub session_timeout_ms: u64,

    /// How often expired sessions are swept, in milliseconds
    #[arg(long, env = "SWEEP_INTERVAL_MS", default_value = "60000")]
    pub sweep_interval_ms: u64,

    /// Deadline for a single command, in milliseconds (0 disables)
    #[arg(long, env = "REQUEST_TIMEOUT_MS", default_value = "0")]
    pub request_timeout_ms: u64,

    /// Longest accepted request line in bytes
    #[arg(long, env = "MAX_LINE_BYTES", default_value = "1048576")]
    pub max_line_bytes: usize,

    /// How long shutdown waits for in-flight connections, in milliseconds
    #[arg(long, env = "SHUTDOWN_GRACE_MS", default_value = "5000")]
    pub shutdown_grace_ms: u64,

    /// Serve the WebSocket bridge
    #[arg(long, env = "BRIDGE_ENABLED", default_value = "true", action = clap::ArgAction::Set)]
    pub bridge_enabled: bool,

    /// Address the WebSocket bridge HTTP server binds to
    #[arg(long, env = "BRIDGE_LISTEN", default_value = "0.0.0.0:8080")]
    pub bridge_listen: SocketAddr,

    /// TCP endpoint the bridge relays to (defaults to the local listener)
    #[arg(long, env = "BRIDGE_UPSTREAM")]
    pub bridge_upstream: Option<SocketAddr>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log output format
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value = "text")]
    pub log_format: LogFormat,

    /// Accounts created at startup, as email:password:name:role separated by commas
    #[arg(long, env = "SEED_USERS")]
    pub seed_users: Option<String>,
}

/// Log line format for the stdout subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines
    Text,
    /// One JSON object per event, with span context
    Json,
}

impl Args {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.worker_count == 0 {
            return Err("WORKER_COUNT must be at least 1".to_string());
        }

        if self.session_timeout_ms == 0 {
            return Err("SESSION_TIMEOUT_MS must be greater than 0".to_string());
        }

        if self.sweep_interval_ms == 0 {
            return Err("SWEEP_INTERVAL_MS must be greater than 0".to_string());
        }

        if self.max_line_bytes == 0 {
            return Err("MAX_LINE_BYTES must be greater than 0".to_string());
        }

        if self.bridge_enabled && self.bridge_listen == self.listen {
            return Err("BRIDGE_LISTEN must differ from LISTEN".to_string());
        }

        Ok(())
    }

    pub fn session_timeout(&self) -> Duration {
        Duration::from_millis(self.session_timeout_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_ms > 0).then(|| Duration::from_millis(self.request_timeout_ms))
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    /// Where the bridge dials: explicit upstream, else loopback on the listener port
    pub fn bridge_upstream(&self) -> SocketAddr {
        self.bridge_upstream
            .unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], self.listen.port())))
    }
}
