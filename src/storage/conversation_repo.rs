use crate::domain::{Conversation, ConversationSummary};
use crate::error::Result;
use crate::storage::records::{ConversationRecord, MessageRecord, SummaryRecord};
use crate::storage::{ConversationRepo, DbPool};
use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Clone, Debug)]
pub struct PgConversationRepo {
    pool: DbPool,
}

impl PgConversationRepo {
    #[must_use]
    pub const fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ConversationRepo for PgConversationRepo {
    async fn create_direct(&self, actor_id: Uuid, recipient_id: Uuid) -> Result<Conversation> {
        let id = Uuid::new_v4();
        let now = OffsetDateTime::now_utc();

        // Conversation and both participant rows land atomically; a failed
        // creation must leave nothing behind.
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r"
            INSERT INTO conversations (id, created_at, updated_at, last_message_at, is_read)
            VALUES ($1, $2, $2, $2, TRUE)
            ",
        )
        .bind(id)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        for user_id in [actor_id, recipient_id] {
            sqlx::query(
                r"
                INSERT INTO participants (id, conversation_id, user_id, joined_at, last_read_at)
                VALUES ($1, $2, $3, $4, $4)
                ",
            )
            .bind(Uuid::new_v4())
            .bind(id)
            .bind(user_id)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        Ok(Conversation { id, created_at: now, last_message_at: now, is_read: true })
    }

    async fn find_direct(&self, actor_id: Uuid, recipient_id: Uuid) -> Result<Option<Conversation>> {
        let record = sqlx::query_as::<_, ConversationRecord>(
            r"
            SELECT c.id, c.created_at, c.last_message_at, c.is_read
            FROM conversations c
            JOIN participants pa ON pa.conversation_id = c.id AND pa.user_id = $1
            JOIN participants pb ON pb.conversation_id = c.id AND pb.user_id = $2
            LIMIT 1
            ",
        )
        .bind(actor_id)
        .bind(recipient_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record.map(Into::into))
    }

    async fn get(&self, conversation_id: Uuid) -> Result<Option<Conversation>> {
        let record = sqlx::query_as::<_, ConversationRecord>(
            "SELECT id, created_at, last_message_at, is_read FROM conversations WHERE id = $1",
        )
        .bind(conversation_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record.map(Into::into))
    }

    async fn list_for_actor(&self, actor_id: Uuid) -> Result<Vec<ConversationSummary>> {
        let rows = sqlx::query_as::<_, SummaryRecord>(
            r"
            SELECT c.id, c.created_at, c.last_message_at,
                   pr.id AS other_id,
                   pr.display_name AS other_display_name,
                   pr.handle AS other_handle,
                   pr.avatar_url AS other_avatar_url
            FROM participants me
            JOIN conversations c ON c.id = me.conversation_id
            JOIN participants p ON p.conversation_id = c.id AND p.user_id <> me.user_id
            JOIN profiles pr ON pr.id = p.user_id
            WHERE me.user_id = $1
            ORDER BY c.last_message_at DESC
            ",
        )
        .bind(actor_id)
        .fetch_all(&self.pool)
        .await?;

        // One last-message lookup per conversation id, not a join-and-filter
        // scan over the whole messages table.
        let mut summaries = Vec::with_capacity(rows.len());
        for row in rows {
            let (mut conversation, other) = row.into_parts();

            let last_message = sqlx::query_as::<_, MessageRecord>(
                r"
                SELECT id, conversation_id, sender_id, content, media_url, media_type, sent_at, is_read
                FROM messages
                WHERE conversation_id = $1
                ORDER BY sent_at DESC, id DESC
                LIMIT 1
                ",
            )
            .bind(conversation.id)
            .fetch_optional(&self.pool)
            .await?;

            let has_unread = sqlx::query_scalar::<_, bool>(
                r"
                SELECT EXISTS (
                    SELECT 1 FROM messages
                    WHERE conversation_id = $1 AND sender_id <> $2 AND is_read = FALSE
                )
                ",
            )
            .bind(conversation.id)
            .bind(actor_id)
            .fetch_one(&self.pool)
            .await?;

            conversation.is_read = !has_unread;
            summaries.push(ConversationSummary {
                conversation,
                other,
                last_message: last_message.map(Into::into),
            });
        }

        Ok(summaries)
    }

    async fn touch_last_message(&self, conversation_id: Uuid, at: OffsetDateTime) -> Result<()> {
        sqlx::query(
            "UPDATE conversations SET last_message_at = $2, updated_at = NOW(), is_read = FALSE WHERE id = $1",
        )
        .bind(conversation_id)
        .bind(at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn advance_last_read(
        &self,
        conversation_id: Uuid,
        actor_id: Uuid,
        at: OffsetDateTime,
    ) -> Result<bool> {
        // The timestamp only ever moves forward.
        let result = sqlx::query(
            r"
            UPDATE participants SET last_read_at = $3
            WHERE conversation_id = $1 AND user_id = $2 AND last_read_at <= $3
            ",
        )
        .bind(conversation_id)
        .bind(actor_id)
        .bind(at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, conversation_id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM conversations WHERE id = $1")
            .bind(conversation_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
