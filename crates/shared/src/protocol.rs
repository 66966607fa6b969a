//! Event stream protocol definitions.
//!
//! Frames are JSON text messages tagged by `type`. Record payloads inside
//! `Create`/`Update`/`Ready` stay as raw JSON here; the sync engine decodes
//! them per kind so that one bad record can be skipped on its own.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Entity kinds addressed by `Create`, `Update` and `Delete` events.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    User,
    Server,
    Channel,
    Member,
    Emoji,
    Message,
    /// A kind this client does not know about.
    #[serde(other)]
    Unknown,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::User => "user",
            EntityKind::Server => "server",
            EntityKind::Channel => "channel",
            EntityKind::Member => "member",
            EntityKind::Emoji => "emoji",
            EntityKind::Message => "message",
            EntityKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The initial full-state snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct ReadyPayload {
    pub users: Vec<Value>,
    pub servers: Vec<Value>,
    pub members: Vec<Value>,
    pub channels: Vec<Value>,
    pub emojis: Vec<Value>,
}

/// Events sent by the server over the event stream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum ServerEvent {
    Authenticated,
    Ready(ReadyPayload),
    Create {
        kind: EntityKind,
        data: Value,
    },
    Update {
        kind: EntityKind,
        id: Value,
        /// `null` when the patch only clears fields.
        #[serde(default)]
        data: Value,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        clear: Vec<String>,
    },
    Delete {
        kind: EntityKind,
        id: Value,
    },
    Pong {
        #[serde(default)]
        data: u64,
    },
    Error {
        error: String,
    },
    /// Any event type this client does not handle.
    #[serde(other)]
    Unknown,
}

/// Commands sent by the client over the event stream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum ClientCommand {
    Authenticate { token: String },
    Ping { data: u64 },
}
