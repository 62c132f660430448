//! Command registry and dispatch
//!
//! Handlers are registered once at startup through [`CommandRegistryBuilder`];
//! the built [`CommandRegistry`] is read-only and shared by every connection.
//!
//! Dispatch never fails: unknown commands, handler errors, handler panics and
//! deadline expiry all become error [`Response`]s so the calling connection
//! keeps serving. Authentication is the handler's job, not the registry's.

use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tracing::{debug, error, warn};

use crate::protocol::{Message, Response};
use crate::session::SessionStore;
use crate::types::{Result, SwitchboardError};

/// A pluggable command implementation
#[async_trait::async_trait]
pub trait CommandHandler: Send + Sync {
    /// Wire `type` this handler answers
    fn command_type(&self) -> &'static str;

    /// Execute one request
    ///
    /// Session-bound commands validate `message.session_id` against
    /// `sessions` themselves and answer with an error Response when it fails.
    async fn handle(&self, message: &Message, sessions: &SessionStore) -> Result<Response>;
}

/// Collects handlers before the listener starts
#[derive(Default)]
pub struct CommandRegistryBuilder {
    handlers: HashMap<String, Arc<dyn CommandHandler>>,
    request_timeout: Option<Duration>,
}

impl CommandRegistryBuilder {
    /// Add a handler; a second handler for the same type is rejected
    pub fn register(mut self, handler: Arc<dyn CommandHandler>) -> Result<Self> {
        let command = handler.command_type();
        if command.is_empty() {
            return Err(SwitchboardError::Registry(
                "handler declares an empty command type".to_string(),
            ));
        }
        if self.handlers.contains_key(command) {
            return Err(SwitchboardError::Registry(format!(
                "duplicate handler for command type {}",
                command
            )));
        }
        self.handlers.insert(command.to_string(), handler);
        Ok(self)
    }

    /// Per-dispatch deadline; `None` leaves handlers unbounded
    pub fn request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn build(self) -> CommandRegistry {
        CommandRegistry {
            handlers: self.handlers,
            request_timeout: self.request_timeout,
        }
    }
}

/// Immutable command type to handler mapping
pub struct CommandRegistry {
    handlers: HashMap<String, Arc<dyn CommandHandler>>,
    request_timeout: Option<Duration>,
}

impl CommandRegistry {
    pub fn builder() -> CommandRegistryBuilder {
        CommandRegistryBuilder::default()
    }

    pub fn lookup(&self, command_type: &str) -> Option<Arc<dyn CommandHandler>> {
        self.handlers.get(command_type).cloned()
    }

    /// Registered command types, sorted
    pub fn commands(&self) -> Vec<&str> {
        let mut commands: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        commands.sort_unstable();
        commands
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Route a validated message to its handler and always produce a reply
    pub async fn dispatch(&self, message: &Message, sessions: &SessionStore) -> Response {
        let request_id = message.reply_id();
        let command = message.command_type();

        let Some(handler) = self.lookup(command) else {
            warn!(command, request_id, "Unknown command");
            return Response::error(request_id, format!("Unknown command: {}", command));
        };

        debug!(command, request_id, "Dispatching");
        let call = AssertUnwindSafe(handler.handle(message, sessions)).catch_unwind();

        let outcome = match self.request_timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    warn!(command, request_id, "Command exceeded {:?}", limit);
                    return Response::error(
                        request_id,
                        format!("Command timed out after {} ms", limit.as_millis()),
                    );
                }
            },
            None => call.await,
        };

        match outcome {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                warn!(command, request_id, "Command failed: {}", e);
                Response::error(request_id, format!("Failed to process command: {}", e))
            }
            Err(panic) => {
                let reason = panic_message(panic.as_ref());
                error!(command, request_id, "Handler panicked: {}", reason);
                Response::error(request_id, format!("Failed to process command: {}", reason))
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}
