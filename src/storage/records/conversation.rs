use crate::domain::{Conversation, Profile};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow)]
pub struct ConversationRecord {
    pub id: Uuid,
    pub created_at: OffsetDateTime,
    pub last_message_at: OffsetDateTime,
    pub is_read: bool,
}

impl From<ConversationRecord> for Conversation {
    fn from(r: ConversationRecord) -> Self {
        Self { id: r.id, created_at: r.created_at, last_message_at: r.last_message_at, is_read: r.is_read }
    }
}

/// Joined row for the conversation list: the conversation plus the
/// counterpart participant's profile snippet.
#[derive(Debug, Clone, FromRow)]
pub struct SummaryRecord {
    pub id: Uuid,
    pub created_at: OffsetDateTime,
    pub last_message_at: OffsetDateTime,
    pub other_id: Uuid,
    pub other_display_name: String,
    pub other_handle: String,
    pub other_avatar_url: Option<String>,
}

impl SummaryRecord {
    /// Splits the joined row; `is_read` is filled in by the caller once the
    /// per-conversation unread lookup has run.
    #[must_use]
    pub fn into_parts(self) -> (Conversation, Profile) {
        (
            Conversation {
                id: self.id,
                created_at: self.created_at,
                last_message_at: self.last_message_at,
                is_read: true,
            },
            Profile {
                id: self.other_id,
                display_name: self.other_display_name,
                handle: self.other_handle,
                avatar_url: self.other_avatar_url,
            },
        )
    }
}
