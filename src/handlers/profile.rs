//! PROFILE command, session-bound
//!
//! `GET` (the default action) returns the caller's principal.

use serde_json::json;

use super::authenticate;
use crate::protocol::{Message, Response};
use crate::registry::CommandHandler;
use crate::session::SessionStore;
use crate::types::Result;

pub const PROFILE_COMMAND: &str = "PROFILE";

pub struct ProfileHandler;

#[async_trait::async_trait]
impl CommandHandler for ProfileHandler {
    fn command_type(&self) -> &'static str {
        PROFILE_COMMAND
    }

    async fn handle(&self, message: &Message, sessions: &SessionStore) -> Result<Response> {
        let principal = match authenticate(message, sessions) {
            Ok(principal) => principal,
            Err(rejection) => return Ok(rejection),
        };

        let action = message.data_str("action").unwrap_or("GET");
        match action.to_ascii_uppercase().as_str() {
            "GET" => Ok(Response::success(
                message.reply_id(),
                "Profile loaded",
                json!({
                    "userId": principal.user_id,
                    "name": principal.name,
                    "email": principal.email,
                    "role": principal.role,
                    "profilePhotoUrl": principal.profile_photo_url,
                }),
            )),
            _ => Ok(Response::error(
                message.reply_id(),
                format!("Unknown action: {}", action),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Principal;

    #[tokio::test]
    async fn test_requires_session() {
        let sessions = SessionStore::default();
        let message = Message::new(PROFILE_COMMAND)
            .with_session("forged")
            .with_request_id("p1");

        let response = ProfileHandler.handle(&message, &sessions).await.unwrap();
        assert!(!response.success);
        assert_eq!(response.request_id, "p1");
        assert_eq!(response.message, "Invalid session");
    }

    #[tokio::test]
    async fn test_get_returns_principal() {
        let sessions = SessionStore::default();
        let session_id = sessions.create_session(Principal {
            user_id: "u-9".to_string(),
            name: "Gil".to_string(),
            email: "gil@example.com".to_string(),
            role: "CONSULTANT".to_string(),
            profile_photo_url: Some("https://cdn.example.com/gil.png".to_string()),
        });

        let message = Message::new(PROFILE_COMMAND).with_session(session_id);
        let response = ProfileHandler.handle(&message, &sessions).await.unwrap();
        assert!(response.success);
        assert_eq!(response.data["userId"], "u-9");
        assert_eq!(response.data["profilePhotoUrl"], "https://cdn.example.com/gil.png");
    }

    #[tokio::test]
    async fn test_unknown_action_echoed_as_sent() {
        let sessions = SessionStore::default();
        let session_id = sessions.create_session(Principal {
            user_id: "u-3".to_string(),
            name: "Ivo".to_string(),
            email: "ivo@example.com".to_string(),
            role: "USER".to_string(),
            profile_photo_url: None,
        });

        let message = Message::new(PROFILE_COMMAND)
            .with_session(session_id)
            .with_data(json!({"action": "Update"}));
        let response = ProfileHandler.handle(&message, &sessions).await.unwrap();
        assert!(!response.success);
        assert_eq!(response.message, "Unknown action: Update");
    }
}
