//! Relay wire protocol. Control messages are JSON text frames tagged by
//! `type`; payload bodies are carried as raw JSON and never re-encoded.

use deskpair_common::SessionId;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::value::RawValue;
use std::fmt;

/// Which slot of a session a connection occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Sends screen frames.
    Producer,
    /// Sends control and pointer events.
    Consumer,
}

impl Role {
    pub fn other(self) -> Role {
        match self {
            Role::Producer => Role::Consumer,
            Role::Consumer => Role::Producer,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Producer => f.write_str("producer"),
            Role::Consumer => f.write_str("consumer"),
        }
    }
}

/// Occupancy snapshot of a session, also the body of `GET /session-status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SessionStatus {
    pub exists: bool,
    pub producer_bound: bool,
    pub consumer_bound: bool,
}

/// An opaque message body travelling between the two ends of a session.
#[derive(Debug, Clone)]
pub enum Payload {
    /// The `data` member of a text `payload` frame, byte-for-byte.
    Json(Box<RawValue>),
    /// A binary frame.
    Binary(Vec<u8>),
}

/// Messages a client sends in text frames.
#[derive(Debug)]
pub enum ClientMessage {
    Attach { session_id: SessionId, role: Role },
    Payload { data: Box<RawValue> },
}

/// Flat view of a client frame. `RawValue` cannot sit inside an internally
/// tagged enum, so frames are read into this struct and then classified.
#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    session_id: Option<SessionId>,
    #[serde(default)]
    role: Option<Role>,
    #[serde(default, deserialize_with = "present")]
    data: Option<Box<RawValue>>,
}

/// `Some` whenever the field is written, so `"data": null` is a payload of
/// `null` rather than a missing body.
fn present<'de, D>(deserializer: D) -> Result<Option<Box<RawValue>>, D::Error>
where
    D: Deserializer<'de>,
{
    Box::<RawValue>::deserialize(deserializer).map(Some)
}

impl ClientMessage {
    pub fn parse(text: &str) -> Result<Self, String> {
        let envelope: Envelope = serde_json::from_str(text).map_err(|e| e.to_string())?;
        match envelope.kind.as_str() {
            "attach" => match (envelope.session_id, envelope.role) {
                (Some(session_id), Some(role)) => Ok(ClientMessage::Attach { session_id, role }),
                _ => Err("attach requires session_id and role".into()),
            },
            "payload" => envelope
                .data
                .map(|data| ClientMessage::Payload { data })
                .ok_or_else(|| "payload requires data".into()),
            other => Err(format!("unknown message type: {other}")),
        }
    }
}

/// Messages the relay sends back to clients.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Attached {
        session_id: SessionId,
        role: Role,
    },
    PartnerConnected {
        role: Role,
    },
    PartnerDisconnected {
        role: Role,
    },
    ConnectionStatus {
        producer_bound: bool,
        consumer_bound: bool,
    },
    Payload {
        data: Box<RawValue>,
    },
    Error {
        code: String,
        message: String,
    },
}

impl ServerMessage {
    pub fn error(code: &str, message: impl Into<String>) -> Self {
        ServerMessage::Error {
            code: code.to_string(),
            message: message.into(),
        }
    }

    pub fn to_json(&self) -> String {
        // Every variant is plain data, so encoding cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }
}
