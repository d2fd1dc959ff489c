//! Frame — the wire envelope for every outbound message.
//!
//! ARCHITECTURE
//! ============
//! Clients and server exchange one JSON object per WebSocket text message.
//! Outbound frames are `{ type, payload, requestId? }`. Replies to a specific
//! request echo its `requestId`; room broadcasts never carry one.
//!
//! DESIGN
//! ======
//! - Payload is always a JSON object, never a bare value.
//! - Errors are ordinary frames with `type = "ERROR"` and a `{ code, message }`
//!   payload. Typed errors map onto wire codes through [`ErrorCode`].

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// =============================================================================
// FIELD CONSTANTS
// =============================================================================

/// Payload key for error messages.
pub const FRAME_MESSAGE: &str = "message";

/// Payload key for grepable error codes.
pub const FRAME_CODE: &str = "code";

/// Frame type for every error reply.
pub const ERROR: &str = "ERROR";

/// Wire error codes.
pub mod codes {
    pub const BAD_REQUEST: &str = "BAD_REQUEST";
    pub const ACCESS_DENIED: &str = "ACCESS_DENIED";
    pub const NOT_JOINED: &str = "NOT_JOINED";
    pub const NOT_FOUND: &str = "NOT_FOUND";
    pub const MALFORMED: &str = "MALFORMED";
    pub const UNKNOWN_EVENT: &str = "UNKNOWN_EVENT";
    pub const SERVER_ERROR: &str = "SERVER_ERROR";
}

/// Outbound frame types.
pub mod kinds {
    pub const ROOM_JOINED: &str = "ROOM_JOINED";
    pub const ROOM_LEFT: &str = "ROOM_LEFT";
    pub const PRESENCE_JOIN: &str = "PRESENCE_JOIN";
    pub const PRESENCE_LEAVE: &str = "PRESENCE_LEAVE";
    pub const PRESENCE_STATE: &str = "PRESENCE_STATE";
    pub const CHAT_NEW: &str = "CHAT_NEW";
    pub const CHAT_TYPING: &str = "CHAT_TYPING";
    pub const CHAT_DELETED: &str = "CHAT_DELETED";
    pub const BOARD_ELEMENT_ADDED: &str = "BOARD_ELEMENT_ADDED";
    pub const BOARD_ELEMENT_UPDATED: &str = "BOARD_ELEMENT_UPDATED";
    pub const BOARD_ELEMENT_DELETED: &str = "BOARD_ELEMENT_DELETED";
    pub const BOARD_ELEMENT_RESTORED: &str = "BOARD_ELEMENT_RESTORED";
    pub const BOARD_ELEMENT_LIVE: &str = "BOARD_ELEMENT_LIVE";
}

/// Opaque generic message sent with `SERVER_ERROR`.
pub const SERVER_ERROR_MESSAGE: &str = "Server error";

// =============================================================================
// TYPES
// =============================================================================

/// JSON object payload. Alias to reduce noise in signatures.
pub type Payload = Map<String, Value>;

/// One outbound message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub payload: Payload,
    #[serde(rename = "requestId", default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<Value>,
}

// =============================================================================
// ERROR CODES
// =============================================================================

/// Grepable wire code for structured error frames.
pub trait ErrorCode: std::fmt::Display {
    fn error_code(&self) -> &'static str;

    /// Message sent to the client. Internal failures override this so that
    /// details stay in the logs.
    fn public_message(&self) -> String {
        self.to_string()
    }
}

// =============================================================================
// CONSTRUCTORS
// =============================================================================

/// Current time as milliseconds since Unix epoch.
pub(crate) fn now_ms() -> i64 {
    let Ok(dur) = SystemTime::now().duration_since(UNIX_EPOCH) else {
        return 0;
    };
    i64::try_from(dur.as_millis()).unwrap_or(0)
}

/// Coerce a JSON value into an object payload. Non-objects become `{}`.
#[must_use]
pub fn into_payload(value: Value) -> Payload {
    match value {
        Value::Object(map) => map,
        _ => Payload::new(),
    }
}

impl Frame {
    /// Create a frame of the given type. `payload` should be a JSON object.
    pub fn new(kind: impl Into<String>, payload: Value) -> Self {
        Self { kind: kind.into(), payload: into_payload(payload), request_id: None }
    }

    /// Create an error frame from a raw code and message.
    pub fn error(code: &str, message: impl Into<String>) -> Self {
        let mut payload = Payload::new();
        payload.insert(FRAME_CODE.into(), Value::String(code.to_string()));
        payload.insert(FRAME_MESSAGE.into(), Value::String(message.into()));
        Self { kind: ERROR.into(), payload, request_id: None }
    }

    /// Create a structured error frame from a typed error.
    #[must_use]
    pub fn error_from(err: &(impl ErrorCode + ?Sized)) -> Self {
        Self::error(err.error_code(), err.public_message())
    }

    /// Serialize for the wire.
    ///
    /// # Errors
    ///
    /// Returns a serde error if the payload cannot be encoded.
    pub fn to_text(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

// =============================================================================
// BUILDERS
// =============================================================================

impl Frame {
    /// Attach the correlation id of the request this frame answers.
    #[must_use]
    pub fn with_request_id(mut self, request_id: Option<Value>) -> Self {
        self.request_id = request_id;
        self
    }

    #[cfg(test)]
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.kind == ERROR
    }

    /// Error code carried by an error frame.
    #[cfg(test)]
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        self.payload.get(FRAME_CODE).and_then(Value::as_str)
    }
}

#[cfg(test)]
#[path = "frame_test.rs"]
mod tests;
