//! Built-in command handlers
//!
//! [`default_handlers`] is the explicit registration list the binary feeds
//! into the registry.

pub mod auth;
pub mod profile;

use std::sync::Arc;

pub use auth::{AuthHandler, AUTH_COMMAND};
pub use profile::{ProfileHandler, PROFILE_COMMAND};

use crate::auth::UserDirectory;
use crate::protocol::{Message, Response};
use crate::registry::CommandHandler;
use crate::session::{Principal, SessionStore};

/// Resolve the caller of a session-bound command
///
/// On failure returns the error Response the handler should send.
pub fn authenticate(
    message: &Message,
    sessions: &SessionStore,
) -> std::result::Result<Principal, Response> {
    sessions
        .validate_session(message.session_id.as_deref())
        .ok_or_else(|| Response::error(message.reply_id(), "Invalid session"))
}

pub fn default_handlers(directory: Arc<dyn UserDirectory>) -> Vec<Arc<dyn CommandHandler>> {
    vec![
        Arc::new(AuthHandler::new(directory)),
        Arc::new(ProfileHandler),
    ]
}
