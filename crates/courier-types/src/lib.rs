//! `courier-types` – shared vocabulary of the courier workspace.
//!
//! Every crate in the workspace speaks in terms of the types defined here:
//!
//! - [`Envelope`] – the immutable unit of traffic between components.
//! - [`Message`] / [`MessageKind`] – the closed set of message kinds and
//!   their kind-specific payloads.
//! - [`RawEnvelope`] – the untyped `{sender, kind, payload}` form adapters
//!   receive from the outside world, validated into an [`Envelope`].
//! - [`LocationEvent`] / [`LocationRecord`] – entries of the location log.
//! - [`CourierError`] – the workspace-wide error type.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

// ─────────────────────────────────────────────────────────────────────────────
// Message kinds
// ─────────────────────────────────────────────────────────────────────────────

/// Tag identifying which payload an [`Envelope`] carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageKind {
    ThreadStarted,
    UserMessage,
    LocationUpdate,
}

impl MessageKind {
    /// Wire name of the kind, e.g. `"USER_MESSAGE"`.
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::ThreadStarted => "THREAD_STARTED",
            MessageKind::UserMessage => "USER_MESSAGE",
            MessageKind::LocationUpdate => "LOCATION_UPDATE",
        }
    }

    /// Parse a wire name.  Returns `None` for kinds outside the closed set.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "THREAD_STARTED" => Some(MessageKind::ThreadStarted),
            "USER_MESSAGE" => Some(MessageKind::UserMessage),
            "LOCATION_UPDATE" => Some(MessageKind::LocationUpdate),
            _ => None,
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind-specific payload.  The variant fully determines which fields exist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Message {
    /// A component announcing that it has booted.
    ThreadStarted,
    /// Free text typed by (or sent to) a user.
    UserMessage { user: String, text: String },
    /// The tracked user arrived at or left a location.
    LocationUpdate { location: String, arrived: bool },
}

impl Message {
    /// The [`MessageKind`] tag of this payload.
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::ThreadStarted => MessageKind::ThreadStarted,
            Message::UserMessage { .. } => MessageKind::UserMessage,
            Message::LocationUpdate { .. } => MessageKind::LocationUpdate,
        }
    }

    /// Shorthand for [`Message::UserMessage`].
    pub fn user_message(user: impl Into<String>, text: impl Into<String>) -> Self {
        Message::UserMessage {
            user: user.into(),
            text: text.into(),
        }
    }

    /// Shorthand for [`Message::LocationUpdate`].
    pub fn location_update(location: impl Into<String>, arrived: bool) -> Self {
        Message::LocationUpdate {
            location: location.into(),
            arrived,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Envelope
// ─────────────────────────────────────────────────────────────────────────────

/// Immutable message routed between components.
///
/// Fields are only readable after construction; there is no way to alter the
/// sender or payload of an envelope once it has been built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    id: Uuid,
    timestamp: DateTime<Utc>,
    /// Name of the originating component, e.g. `"Telegram"`.
    sender: String,
    #[serde(flatten)]
    message: Message,
}

impl Envelope {
    /// Wrap `message` from `sender`, stamping a fresh id and the current time.
    pub fn new(sender: impl Into<String>, message: Message) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            sender: sender.into(),
            message,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn sender(&self) -> &str {
        &self.sender
    }

    pub fn kind(&self) -> MessageKind {
        self.message.kind()
    }

    pub fn message(&self) -> &Message {
        &self.message
    }

    /// Decode the untyped inbound JSON contract
    /// (`{"sender": .., "kind": .., "payload": {..}}`).
    pub fn from_json(raw: &str) -> Result<Self, CourierError> {
        let raw: RawEnvelope = serde_json::from_str(raw)
            .map_err(|e| CourierError::Serialization(e.to_string()))?;
        Self::try_from(raw)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Raw (untyped) envelope
// ─────────────────────────────────────────────────────────────────────────────

/// The loosely typed envelope an adapter assembles from its external
/// protocol before handing it to the bus.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawEnvelope {
    pub sender: String,
    pub kind: String,
    #[serde(default)]
    pub payload: Map<String, Value>,
}

impl TryFrom<RawEnvelope> for Envelope {
    type Error = CourierError;

    fn try_from(raw: RawEnvelope) -> Result<Self, Self::Error> {
        let kind = MessageKind::parse(&raw.kind)
            .ok_or_else(|| CourierError::UnknownKind(raw.kind.clone()))?;
        let message = match kind {
            MessageKind::ThreadStarted => Message::ThreadStarted,
            MessageKind::UserMessage => Message::UserMessage {
                user: string_field(kind, &raw.payload, "user")?,
                text: string_field(kind, &raw.payload, "text")?,
            },
            MessageKind::LocationUpdate => Message::LocationUpdate {
                location: string_field(kind, &raw.payload, "location")?,
                arrived: bool_field(kind, &raw.payload, "arrived")?,
            },
        };
        Ok(Envelope::new(raw.sender, message))
    }
}

fn string_field(
    kind: MessageKind,
    payload: &Map<String, Value>,
    field: &'static str,
) -> Result<String, CourierError> {
    payload
        .get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or(CourierError::MalformedPayload { kind, field })
}

fn bool_field(
    kind: MessageKind,
    payload: &Map<String, Value>,
    field: &'static str,
) -> Result<bool, CourierError> {
    payload
        .get(field)
        .and_then(Value::as_bool)
        .ok_or(CourierError::MalformedPayload { kind, field })
}

// ─────────────────────────────────────────────────────────────────────────────
// Location history
// ─────────────────────────────────────────────────────────────────────────────

/// Whether a location record marks an arrival or a departure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocationEvent {
    Arrived,
    Left,
}

impl LocationEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            LocationEvent::Arrived => "arrived",
            LocationEvent::Left => "left",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "arrived" => Some(LocationEvent::Arrived),
            "left" => Some(LocationEvent::Left),
            _ => None,
        }
    }
}

impl fmt::Display for LocationEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of the append-only location history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationRecord {
    pub user: String,
    pub location: String,
    pub event: LocationEvent,
    pub timestamp: DateTime<Utc>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

/// Workspace-wide error type covering routing, payload validation, and
/// location persistence failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CourierError {
    #[error("component `{0}` is already registered")]
    DuplicateComponent(String),

    #[error("no component named `{0}` is registered")]
    UnknownComponent(String),

    #[error("no responder is configured for sender `{0}`")]
    UnroutableSender(String),

    #[error("mailbox of `{0}` is closed")]
    MailboxClosed(String),

    #[error("location history is empty")]
    NoHistory,

    #[error("{kind} payload is missing field `{field}` or it has the wrong type")]
    MalformedPayload {
        kind: MessageKind,
        field: &'static str,
    },

    #[error("unsupported message kind `{0}`")]
    UnknownKind(String),

    #[error("invalid reply pattern `{pattern}`: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("location log failure: {0}")]
    PersistenceFailure(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(kind: &str, payload: Value) -> RawEnvelope {
        RawEnvelope {
            sender: "Telegram".to_string(),
            kind: kind.to_string(),
            payload: payload.as_object().cloned().unwrap_or_default(),
        }
    }

    #[test]
    fn user_message_decodes_from_raw() {
        let env = Envelope::try_from(raw("USER_MESSAGE", json!({"user": "x", "text": "Ping"})))
            .unwrap();
        assert_eq!(env.sender(), "Telegram");
        assert_eq!(env.kind(), MessageKind::UserMessage);
        assert_eq!(env.message(), &Message::user_message("x", "Ping"));
    }

    #[test]
    fn location_update_requires_boolean_arrived() {
        let err = Envelope::try_from(raw(
            "LOCATION_UPDATE",
            json!({"location": "Home", "arrived": "yes"}),
        ))
        .unwrap_err();
        assert_eq!(
            err,
            CourierError::MalformedPayload {
                kind: MessageKind::LocationUpdate,
                field: "arrived"
            }
        );
    }

    #[test]
    fn missing_text_is_malformed() {
        let err = Envelope::try_from(raw("USER_MESSAGE", json!({"user": "x"}))).unwrap_err();
        assert!(matches!(
            err,
            CourierError::MalformedPayload { field: "text", .. }
        ));
    }

    #[test]
    fn thread_started_ignores_payload() {
        let env = Envelope::try_from(raw("THREAD_STARTED", json!({}))).unwrap();
        assert_eq!(env.kind(), MessageKind::ThreadStarted);
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let err = Envelope::try_from(raw("HEARTBEAT", json!({}))).unwrap_err();
        assert_eq!(err, CourierError::UnknownKind("HEARTBEAT".to_string()));
    }

    #[test]
    fn from_json_reads_wire_contract() {
        let env = Envelope::from_json(
            r#"{"sender":"Gps","kind":"LOCATION_UPDATE","payload":{"location":"Work","arrived":true}}"#,
        )
        .unwrap();
        assert_eq!(env.sender(), "Gps");
        assert_eq!(env.message(), &Message::location_update("Work", true));
    }

    #[test]
    fn from_json_rejects_garbage() {
        let err = Envelope::from_json("not json").unwrap_err();
        assert!(matches!(err, CourierError::Serialization(_)));
    }

    #[test]
    fn envelope_serializes_kind_and_payload_at_top_level() {
        let env = Envelope::new("Main", Message::user_message("x", "Pong."));
        let value = serde_json::to_value(&env).unwrap();
        assert_eq!(value["sender"], "Main");
        assert_eq!(value["kind"], "USER_MESSAGE");
        assert_eq!(value["payload"]["text"], "Pong.");
    }

    #[test]
    fn message_kind_names_are_stable() {
        for kind in [
            MessageKind::ThreadStarted,
            MessageKind::UserMessage,
            MessageKind::LocationUpdate,
        ] {
            assert_eq!(MessageKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(LocationEvent::parse("left"), Some(LocationEvent::Left));
        assert_eq!(LocationEvent::parse("gone"), None);
    }

    #[test]
    fn error_display_names_the_component() {
        let err = CourierError::UnknownComponent("TwitterRest".to_string());
        assert!(err.to_string().contains("TwitterRest"));
    }
}
