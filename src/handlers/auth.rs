//! AUTH command
//!
//! Pre-authentication entry point. `data.action` selects one of:
//! - `LOGIN`: `email`, `password` -> opens a session
//! - `REGISTER`: `name`, `email`, `password`, `role` -> creates the account and opens a session
//! - `LOGOUT`: drops the session named by `sessionId`, always succeeds

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{info, warn};

use crate::auth::{verify_password, NewUser, Role, UserDirectory, UserRecord};
use crate::protocol::{Message, Response};
use crate::registry::CommandHandler;
use crate::session::SessionStore;
use crate::types::{Result, SwitchboardError};

pub const AUTH_COMMAND: &str = "AUTH";

pub struct AuthHandler {
    directory: Arc<dyn UserDirectory>,
}

impl AuthHandler {
    pub fn new(directory: Arc<dyn UserDirectory>) -> Self {
        Self { directory }
    }

    async fn login(&self, message: &Message, sessions: &SessionStore) -> Result<Response> {
        let request_id = message.reply_id();
        let (Ok(email), Ok(password)) = (message.require_str("email"), message.require_str("password"))
        else {
            return Ok(Response::error(request_id, "Email and password are required"));
        };

        let Some(user) = self.directory.find_by_email(email).await? else {
            warn!("Login failed - user not found");
            return Ok(Response::error(request_id, "User not found"));
        };

        if !verify_password(password, &user.password_hash)? {
            warn!(user_id = %user.id, "Login failed - incorrect password");
            return Ok(Response::error(request_id, "Incorrect password"));
        }

        let session_id = sessions.create_session(user.principal());
        info!(user_id = %user.id, "Login successful");
        Ok(Response::success(
            request_id,
            "Login successful",
            session_payload(&session_id, &user),
        ))
    }

    async fn register(&self, message: &Message, sessions: &SessionStore) -> Result<Response> {
        let request_id = message.reply_id();
        let fields = (
            message.require_str("name"),
            message.require_str("email"),
            message.require_str("password"),
            message.require_str("role"),
        );
        let (Ok(name), Ok(email), Ok(password), Ok(role)) = fields else {
            return Ok(Response::error(
                request_id,
                "Name, email, password and role are required",
            ));
        };

        let role: Role = match role.parse() {
            Ok(role) => role,
            Err(e) => return Ok(Response::error(request_id, e.to_string())),
        };

        let new_user = NewUser {
            name: name.to_string(),
            email: email.to_string(),
            password: password.to_string(),
            role,
        };
        let user = match self.directory.create(new_user).await {
            Ok(user) => user,
            Err(SwitchboardError::Handler(reason)) => {
                return Ok(Response::error(request_id, reason))
            }
            Err(e) => return Err(e),
        };

        let session_id = sessions.create_session(user.principal());
        Ok(Response::success(
            request_id,
            "Registration successful",
            session_payload(&session_id, &user),
        ))
    }

    fn logout(&self, message: &Message, sessions: &SessionStore) -> Response {
        let session_id = message
            .session_id
            .as_deref()
            .or_else(|| message.data_str("sessionId"));
        if let Some(session_id) = session_id {
            sessions.invalidate_session(session_id);
        }
        Response::success(message.reply_id(), "Logout successful", json!({}))
    }
}

fn session_payload(session_id: &str, user: &UserRecord) -> Value {
    let mut data = json!({
        "sessionId": session_id,
        "userId": user.id,
        "name": user.name,
        "email": user.email,
        "role": user.role.as_str(),
    });
    if let (Some(url), Value::Object(map)) = (&user.profile_photo_url, &mut data) {
        map.insert("profilePhotoUrl".to_string(), Value::String(url.clone()));
    }
    data
}

#[async_trait::async_trait]
impl CommandHandler for AuthHandler {
    fn command_type(&self) -> &'static str {
        AUTH_COMMAND
    }

    async fn handle(&self, message: &Message, sessions: &SessionStore) -> Result<Response> {
        let Some(action) = message.data_str("action") else {
            return Ok(Response::error(message.reply_id(), "Action not specified"));
        };

        match action.to_ascii_uppercase().as_str() {
            "LOGIN" => self.login(message, sessions).await,
            "REGISTER" => self.register(message, sessions).await,
            "LOGOUT" => Ok(self.logout(message, sessions)),
            _ => Ok(Response::error(
                message.reply_id(),
                format!("Unknown action: {}", action),
            )),
        }
    }
}
