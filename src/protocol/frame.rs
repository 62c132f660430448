//! Newline-delimited JSON framing
//!
//! Every frame on the wire is exactly one JSON object terminated by `\n`.
//! Requests decode into [`Message`], replies encode from [`Response`].
//! Payload shape inside `data` is left to the command handlers.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::types::{Result, SwitchboardError};

/// `type` carried by every reply
pub const RESPONSE_TYPE: &str = "RESPONSE";

/// Request id echoed when the client did not supply one (or it could not be recovered)
pub const UNKNOWN_REQUEST_ID: &str = "unknown";

/// Client to server request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Command name used for routing
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    /// Command-specific payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Map<String, Value>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl Message {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: Some(kind.into()),
            ..Default::default()
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        if let Value::Object(map) = data {
            self.data = Some(map);
        }
        self
    }

    /// Command type, empty when absent
    pub fn command_type(&self) -> &str {
        self.kind.as_deref().unwrap_or("")
    }

    /// Request id to echo back in the reply
    pub fn reply_id(&self) -> &str {
        self.request_id.as_deref().unwrap_or(UNKNOWN_REQUEST_ID)
    }

    /// String field from `data`, if present and a string
    pub fn data_str(&self, key: &str) -> Option<&str> {
        self.data.as_ref()?.get(key)?.as_str()
    }

    /// Non-empty string field from `data`, or a handler error naming it
    pub fn require_str(&self, key: &str) -> Result<&str> {
        match self.data_str(key) {
            Some(value) if !value.is_empty() => Ok(value),
            _ => Err(SwitchboardError::handler(format!("Missing field: {}", key))),
        }
    }
}

/// Server to client reply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    #[serde(rename = "type")]
    pub kind: String,
    pub request_id: String,
    pub success: bool,
    pub message: String,
    #[serde(default)]
    pub data: Map<String, Value>,
}

impl Response {
    /// Successful reply; a non-object `data` is replaced by `{}`
    pub fn success(request_id: impl Into<String>, message: impl Into<String>, data: Value) -> Self {
        let data = match data {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            kind: RESPONSE_TYPE.to_string(),
            request_id: request_id.into(),
            success: true,
            message: message.into(),
            data,
        }
    }

    /// Failed reply with an empty payload
    pub fn error(request_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: RESPONSE_TYPE.to_string(),
            request_id: request_id.into(),
            success: false,
            message: message.into(),
            data: Map::new(),
        }
    }
}

/// Encode a reply as one wire line, terminator included
pub fn encode(response: &Response) -> String {
    let value = json!({
        "type": response.kind,
        "requestId": response.request_id,
        "success": response.success,
        "message": response.message,
        "data": response.data,
    });
    let mut line = value.to_string();
    line.push('\n');
    line
}

/// Decode one wire line
///
/// Returns `None` for anything that is not a JSON object of the expected
/// shape. Never panics on client input.
pub fn decode(line: &str) -> Option<Message> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    serde_json::from_str(trimmed).ok()
}

/// A message is routable when it carries a non-empty `type`
pub fn is_valid(message: Option<&Message>) -> bool {
    message.is_some_and(|m| !m.command_type().is_empty())
}

/// Best-effort `requestId` from a line that failed to decode or validate
pub fn recover_request_id(line: &str) -> String {
    serde_json::from_str::<Value>(line.trim())
        .ok()
        .and_then(|value| match value.get("requestId") {
            Some(Value::String(id)) => Some(id.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        })
        .unwrap_or_else(|| UNKNOWN_REQUEST_ID.to_string())
}
