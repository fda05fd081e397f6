use crate::domain::{MediaKind, Message};
use crate::error::Result;
use crate::storage::records::MessageRecord;
use crate::storage::{DbPool, MessageRepo};
use async_trait::async_trait;
use uuid::Uuid;

#[derive(Clone, Debug)]
pub struct PgMessageRepo {
    pool: DbPool,
}

impl PgMessageRepo {
    #[must_use]
    pub const fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageRepo for PgMessageRepo {
    async fn insert(&self, message: &Message) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO messages (id, conversation_id, sender_id, content, media_url, media_type, sent_at, is_read)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ",
        )
        .bind(message.id)
        .bind(message.conversation_id)
        .bind(message.sender_id)
        .bind(message.content.as_deref())
        .bind(message.media_url.as_deref())
        .bind(message.media_kind.map(MediaKind::as_str))
        .bind(message.sent_at)
        .bind(message.is_read)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_for_conversation(&self, conversation_id: Uuid) -> Result<Vec<Message>> {
        let records = sqlx::query_as::<_, MessageRecord>(
            r"
            SELECT id, conversation_id, sender_id, content, media_url, media_type, sent_at, is_read
            FROM messages
            WHERE conversation_id = $1
            ORDER BY sent_at ASC, id ASC
            ",
        )
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(records.into_iter().map(Into::into).collect())
    }

    async fn mark_read_excluding_sender(&self, conversation_id: Uuid, actor_id: Uuid) -> Result<u64> {
        let result = sqlx::query(
            r"
            UPDATE messages SET is_read = TRUE
            WHERE conversation_id = $1 AND sender_id <> $2 AND is_read = FALSE
            ",
        )
        .bind(conversation_id)
        .bind(actor_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
