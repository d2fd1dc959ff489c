//! Inbound events — envelope parsing and per-kind payload decoding.
//!
//! DESIGN
//! ======
//! Inbound frames go through three stages before any handler runs:
//! 1. `Envelope::parse`: well-formed JSON object with a string `type`
//!    naming a known [`EventKind`]. Failures are protocol errors.
//! 2. `Event::decode`: the payload becomes a typed struct with required
//!    fields present, correctly typed and length-bounded. Failures are
//!    `BAD_REQUEST`.
//! 3. The router matches on [`Event`] exhaustively.
//!
//! Authorization never sees an unvalidated payload.

use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use crate::frame::{ErrorCode, Payload, SERVER_ERROR_MESSAGE, codes};
use crate::services::access::AccessError;
use crate::store::StoreError;

/// Default cap for non-empty string fields, measured after trimming.
pub const MAX_STRING_LEN: usize = 5000;

/// Cap for chat message text, measured after trimming.
pub const MAX_CHAT_TEXT_LEN: usize = 500;

// =============================================================================
// ERRORS
// =============================================================================

/// Frame-level failures. The connection always stays open.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("Frame too large")]
    TooLarge,
    #[error("Invalid JSON")]
    InvalidJson,
    #[error("Missing type")]
    MissingType,
    #[error("Unknown event type")]
    UnknownEvent(String),
}

impl ErrorCode for ProtocolError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::TooLarge | Self::InvalidJson | Self::MissingType => codes::MALFORMED,
            Self::UnknownEvent(_) => codes::UNKNOWN_EVENT,
        }
    }
}

/// A rejected frame plus whatever correlation id could be recovered.
#[derive(Debug)]
pub struct Rejection {
    pub error: ProtocolError,
    pub request_id: Option<Value>,
}

/// Handler-level failures, one variant per wire code.
#[derive(Debug, thiserror::Error)]
pub enum EventError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    AccessDenied(String),
    #[error("Join room first")]
    NotJoined,
    #[error("{0}")]
    NotFound(String),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl EventError {
    pub fn bad_request(message: &str) -> Self {
        Self::BadRequest(message.to_string())
    }

    pub fn access_denied(message: &str) -> Self {
        Self::AccessDenied(message.to_string())
    }

    pub fn not_found(message: &str) -> Self {
        Self::NotFound(message.to_string())
    }
}

impl ErrorCode for EventError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => codes::BAD_REQUEST,
            Self::AccessDenied(_) => codes::ACCESS_DENIED,
            Self::NotJoined => codes::NOT_JOINED,
            Self::NotFound(_) => codes::NOT_FOUND,
            Self::Store(_) => codes::SERVER_ERROR,
        }
    }

    fn public_message(&self) -> String {
        match self {
            Self::Store(_) => SERVER_ERROR_MESSAGE.into(),
            other => other.to_string(),
        }
    }
}

impl From<AccessError> for EventError {
    fn from(err: AccessError) -> Self {
        match err {
            AccessError::Store(e) => Self::Store(e),
            denied => Self::AccessDenied(denied.to_string()),
        }
    }
}

// =============================================================================
// ENVELOPE
// =============================================================================

/// Every inbound event type the router understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    RoomJoin,
    RoomLeave,
    ChatSend,
    ChatTyping,
    ChatDelete,
    BoardElementAdd,
    BoardElementUpdate,
    BoardElementDelete,
    BoardElementRestore,
    BoardElementLive,
    PresenceUpdate,
}

impl EventKind {
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let kind = match raw {
            "ROOM_JOIN" => Self::RoomJoin,
            "ROOM_LEAVE" => Self::RoomLeave,
            "CHAT_SEND" => Self::ChatSend,
            "CHAT_TYPING" => Self::ChatTyping,
            "CHAT_DELETE" => Self::ChatDelete,
            "BOARD_ELEMENT_ADD" => Self::BoardElementAdd,
            "BOARD_ELEMENT_UPDATE" => Self::BoardElementUpdate,
            "BOARD_ELEMENT_DELETE" => Self::BoardElementDelete,
            "BOARD_ELEMENT_RESTORE" => Self::BoardElementRestore,
            "BOARD_ELEMENT_LIVE" => Self::BoardElementLive,
            "PRESENCE_UPDATE" => Self::PresenceUpdate,
            _ => return None,
        };
        Some(kind)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RoomJoin => "ROOM_JOIN",
            Self::RoomLeave => "ROOM_LEAVE",
            Self::ChatSend => "CHAT_SEND",
            Self::ChatTyping => "CHAT_TYPING",
            Self::ChatDelete => "CHAT_DELETE",
            Self::BoardElementAdd => "BOARD_ELEMENT_ADD",
            Self::BoardElementUpdate => "BOARD_ELEMENT_UPDATE",
            Self::BoardElementDelete => "BOARD_ELEMENT_DELETE",
            Self::BoardElementRestore => "BOARD_ELEMENT_RESTORE",
            Self::BoardElementLive => "BOARD_ELEMENT_LIVE",
            Self::PresenceUpdate => "PRESENCE_UPDATE",
        }
    }

    /// High-frequency ephemeral events, kept out of info-level logs.
    #[must_use]
    pub fn is_ephemeral(self) -> bool {
        matches!(self, Self::ChatTyping | Self::BoardElementLive | Self::PresenceUpdate)
    }
}

#[derive(Deserialize)]
struct RawEnvelope {
    #[serde(rename = "type", default)]
    kind: Option<Value>,
    #[serde(default)]
    payload: Option<Value>,
    #[serde(rename = "requestId", default)]
    request_id: Option<Value>,
}

/// A well-formed inbound frame whose type is known.
#[derive(Debug)]
pub struct Envelope {
    pub kind: EventKind,
    pub payload: Value,
    pub request_id: Option<Value>,
}

impl Envelope {
    /// Parse one inbound text frame.
    ///
    /// # Errors
    ///
    /// Returns a [`Rejection`] for invalid JSON, a missing or non-string
    /// `type`, or an unknown `type`.
    pub fn parse(text: &str) -> Result<Self, Rejection> {
        let invalid = || Rejection { error: ProtocolError::InvalidJson, request_id: None };
        let value: Value = serde_json::from_str(text).map_err(|_| invalid())?;
        if !value.is_object() {
            return Err(invalid());
        }
        let raw: RawEnvelope = serde_json::from_value(value).map_err(|_| invalid())?;

        let Some(Value::String(kind)) = raw.kind else {
            return Err(Rejection { error: ProtocolError::MissingType, request_id: raw.request_id });
        };
        let Some(kind) = EventKind::parse(&kind) else {
            return Err(Rejection { error: ProtocolError::UnknownEvent(kind), request_id: raw.request_id });
        };

        Ok(Self { kind, payload: raw.payload.unwrap_or(Value::Null), request_id: raw.request_id })
    }
}

// =============================================================================
// TYPED PAYLOADS
// =============================================================================

/// `ROOM_JOIN` / `ROOM_LEAVE`. The id stays raw so the gate can report
/// an invalid id as a denial.
#[derive(Debug, Clone, PartialEq)]
pub struct RoomRef {
    pub room_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatSend {
    pub room_id: Uuid,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatTyping {
    pub room_id: Uuid,
    pub is_typing: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatDelete {
    pub room_id: Uuid,
    pub message_id: Uuid,
    pub for_everyone: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ElementAdd {
    pub room_id: Uuid,
    pub element_id: String,
    pub kind: String,
    pub data: Payload,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ElementUpdate {
    pub room_id: Uuid,
    pub element_id: String,
    pub patch: Payload,
}

/// `BOARD_ELEMENT_DELETE`.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementRef {
    pub room_id: Uuid,
    pub element_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ElementRestore {
    pub room_id: Uuid,
    pub element_id: String,
    pub data: Option<Payload>,
}

/// Transient element state; forwarded as sent once the id and type check out.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementLive {
    pub room_id: Uuid,
    pub element: Payload,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PresenceUpdate {
    pub room_id: Uuid,
    pub cursor: Value,
}

/// A decoded, validated inbound event.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    RoomJoin(RoomRef),
    RoomLeave(RoomRef),
    ChatSend(ChatSend),
    ChatTyping(ChatTyping),
    ChatDelete(ChatDelete),
    BoardElementAdd(ElementAdd),
    BoardElementUpdate(ElementUpdate),
    BoardElementDelete(ElementRef),
    BoardElementRestore(ElementRestore),
    BoardElementLive(ElementLive),
    PresenceUpdate(PresenceUpdate),
}

const ROOM_REQUIRED: &str = "roomId is required";
const INVALID_PAYLOAD: &str = "Invalid payload";
const INVALID_ELEMENT: &str = "Invalid element";
const TEXT_REQUIRED: &str = "Text is required";
const PATCH_REQUIRED: &str = "patch is required";

impl Event {
    /// Decode and validate the payload for `kind`.
    ///
    /// # Errors
    ///
    /// Returns `EventError::BadRequest` when a required field is missing,
    /// mistyped or out of bounds.
    pub fn decode(kind: EventKind, payload: Value) -> Result<Self, EventError> {
        let payload = match payload {
            Value::Null => Payload::new(),
            Value::Object(map) => map,
            _ => return Err(EventError::bad_request("payload must be an object")),
        };
        let p = &payload;

        let event = match kind {
            EventKind::RoomJoin => Self::RoomJoin(RoomRef { room_id: raw_room_id(p)? }),
            EventKind::RoomLeave => Self::RoomLeave(RoomRef { room_id: raw_room_id(p)? }),
            EventKind::ChatSend => {
                let room_id = room_id(p)?;
                let text = non_empty(p.get("text"), MAX_CHAT_TEXT_LEN)
                    .ok_or_else(|| EventError::bad_request(TEXT_REQUIRED))?;
                Self::ChatSend(ChatSend { room_id, text: text.trim().to_string() })
            }
            EventKind::ChatTyping => Self::ChatTyping(ChatTyping { room_id: room_id(p)?, is_typing: flag(p, "isTyping") }),
            EventKind::ChatDelete => {
                let room_id = uuid_field(p, "roomId").ok_or_else(|| EventError::bad_request(INVALID_PAYLOAD))?;
                let message_id = uuid_field(p, "messageId").ok_or_else(|| EventError::bad_request(INVALID_PAYLOAD))?;
                Self::ChatDelete(ChatDelete { room_id, message_id, for_everyone: flag(p, "forEveryone") })
            }
            EventKind::BoardElementAdd => {
                let room_id = room_id(p)?;
                let element = element_object(p)?;
                let data = match element.get("data") {
                    None | Some(Value::Null) => Payload::new(),
                    Some(Value::Object(data)) => data.clone(),
                    Some(_) => return Err(EventError::bad_request(INVALID_ELEMENT)),
                };
                Self::BoardElementAdd(ElementAdd {
                    room_id,
                    element_id: element_string(element, "elementId")?,
                    kind: element_string(element, "type")?,
                    data,
                })
            }
            EventKind::BoardElementUpdate => {
                let (room_id, element_id) = element_target(p)?;
                let Some(Value::Object(patch)) = p.get("patch") else {
                    return Err(EventError::bad_request(PATCH_REQUIRED));
                };
                Self::BoardElementUpdate(ElementUpdate { room_id, element_id, patch: patch.clone() })
            }
            EventKind::BoardElementDelete => {
                let (room_id, element_id) = element_target(p)?;
                Self::BoardElementDelete(ElementRef { room_id, element_id })
            }
            EventKind::BoardElementRestore => {
                let (room_id, element_id) = element_target(p)?;
                let data = p
                    .get("element")
                    .and_then(|e| e.get("data"))
                    .and_then(Value::as_object)
                    .cloned();
                Self::BoardElementRestore(ElementRestore { room_id, element_id, data })
            }
            EventKind::BoardElementLive => {
                let room_id = room_id(p)?;
                let element = element_object(p)?;
                element_string(element, "elementId")?;
                element_string(element, "type")?;
                Self::BoardElementLive(ElementLive { room_id, element: element.clone() })
            }
            EventKind::PresenceUpdate => Self::PresenceUpdate(PresenceUpdate {
                room_id: room_id(p)?,
                cursor: p.get("cursor").cloned().unwrap_or(Value::Null),
            }),
        };
        Ok(event)
    }
}

// =============================================================================
// FIELD HELPERS
// =============================================================================

/// A string that is non-empty after trimming and within `max` characters.
fn non_empty(value: Option<&Value>, max: usize) -> Option<&str> {
    let s = value?.as_str()?;
    let len = s.trim().chars().count();
    (len > 0 && len <= max).then_some(s)
}

fn uuid_field(p: &Payload, key: &str) -> Option<Uuid> {
    p.get(key)?.as_str()?.parse().ok()
}

/// Loose boolean: absent, `null`, `false`, `0` and `""` are false,
/// anything else is true.
fn flag(p: &Payload, key: &str) -> bool {
    match p.get(key) {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|n| n != 0.0),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(_) | Value::Object(_)) => true,
    }
}

fn raw_room_id(p: &Payload) -> Result<String, EventError> {
    non_empty(p.get("roomId"), MAX_STRING_LEN)
        .map(str::to_string)
        .ok_or_else(|| EventError::bad_request(ROOM_REQUIRED))
}

fn room_id(p: &Payload) -> Result<Uuid, EventError> {
    uuid_field(p, "roomId").ok_or_else(|| EventError::bad_request(ROOM_REQUIRED))
}

fn element_target(p: &Payload) -> Result<(Uuid, String), EventError> {
    let room_id = uuid_field(p, "roomId").ok_or_else(|| EventError::bad_request(INVALID_PAYLOAD))?;
    let element_id = non_empty(p.get("elementId"), MAX_STRING_LEN)
        .ok_or_else(|| EventError::bad_request(INVALID_PAYLOAD))?;
    Ok((room_id, element_id.to_string()))
}

fn element_object(p: &Payload) -> Result<&Payload, EventError> {
    p.get("element")
        .and_then(Value::as_object)
        .ok_or_else(|| EventError::bad_request(INVALID_ELEMENT))
}

fn element_string(element: &Payload, key: &str) -> Result<String, EventError> {
    non_empty(element.get(key), MAX_STRING_LEN)
        .map(str::to_string)
        .ok_or_else(|| EventError::bad_request(INVALID_ELEMENT))
}

#[cfg(test)]
#[path = "event_test.rs"]
mod tests;
