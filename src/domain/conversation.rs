use crate::domain::message::Message;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// Denormalized actor snippet sourced from the identity service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: Uuid,
    pub display_name: String,
    pub handle: String,
    pub avatar_url: Option<String>,
}

/// A messaging thread between exactly two actors.
///
/// `is_read` is a derived convenience flag; the authoritative read state
/// lives per-message and per-participant (`last_read_at`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub last_message_at: OffsetDateTime,
    pub is_read: bool,
}

/// An actor's membership record within a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub user_id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub joined_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub last_read_at: OffsetDateTime,
    pub profile: Profile,
}

/// One row of the conversation list: the conversation, the counterpart's
/// profile, and the latest message for preview purposes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationSummary {
    pub conversation: Conversation,
    pub other: Profile,
    pub last_message: Option<Message>,
}

/// Transient search hit, produced only for actors inside the caller's
/// follow-graph neighborhood.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchResult {
    pub user_id: Uuid,
    pub display_name: String,
    pub handle: String,
    pub avatar_url: Option<String>,
}

/// Result of the deliberately non-atomic two-step mark-read operation.
///
/// A half-failed outcome is an accepted degraded state; the next mark-read
/// call self-heals it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarkReadOutcome {
    pub messages_updated: bool,
    pub timestamp_updated: bool,
}

impl MarkReadOutcome {
    #[must_use]
    pub const fn complete(&self) -> bool {
        self.messages_updated && self.timestamp_updated
    }
}
