use crate::domain::Message;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow)]
pub struct MessageRecord {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub content: Option<String>,
    pub media_url: Option<String>,
    pub media_type: Option<String>,
    pub sent_at: OffsetDateTime,
    pub is_read: bool,
}

impl From<MessageRecord> for Message {
    fn from(r: MessageRecord) -> Self {
        Self {
            id: r.id,
            conversation_id: r.conversation_id,
            sender_id: r.sender_id,
            content: r.content,
            media_url: r.media_url,
            // An unrecognized media type degrades to no attachment rather
            // than failing the whole row.
            media_kind: r.media_type.as_deref().and_then(|s| s.parse().ok()),
            sent_at: r.sent_at,
            is_read: r.is_read,
        }
    }
}
