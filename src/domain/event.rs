use crate::domain::message::Message;
use serde::{Deserialize, Serialize};

/// Table name the messages channel is keyed by.
pub const MESSAGES_TABLE: &str = "messages";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Insert,
}

/// Row-insert notification delivered over the push channel.
///
/// The channel carries every insert for a table; no per-conversation
/// filtering happens server-side, so clients filter by `conversation_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub table: String,
    pub row: Message,
}

impl PushEvent {
    #[must_use]
    pub fn message_inserted(row: Message) -> Self {
        Self { kind: EventKind::Insert, table: MESSAGES_TABLE.to_string(), row }
    }
}
