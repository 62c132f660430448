//! Error types for switchboard

/// Main error type for switchboard operations
#[derive(Debug, thiserror::Error)]
pub enum SwitchboardError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("{0}")]
    Handler(String),

    #[error("Registry error: {0}")]
    Registry(String),

    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl SwitchboardError {
    /// Shorthand for a handler failure carrying a client-facing message
    pub fn handler(msg: impl Into<String>) -> Self {
        Self::Handler(msg.into())
    }

    /// Whether the error is a transport failure that must close the connection
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Io(_) | Self::WebSocket(_))
    }
}

impl From<serde_json::Error> for SwitchboardError {
    fn from(err: serde_json::Error) -> Self {
        Self::Protocol(format!("JSON error: {}", err))
    }
}

impl From<hyper::Error> for SwitchboardError {
    fn from(err: hyper::Error) -> Self {
        Self::Internal(format!("HTTP error: {}", err))
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for SwitchboardError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::WebSocket(err.to_string())
    }
}

/// Result type alias for switchboard operations
pub type Result<T> = std::result::Result<T, SwitchboardError>;
