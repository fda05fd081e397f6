use crate::config::MessagingConfig;
use crate::domain::{
    AttachmentRef, Conversation, ConversationSummary, MarkReadOutcome, Message, PushEvent, SearchResult,
};
use crate::error::{AppError, Result};
use crate::services::attachment_service::AttachmentService;
use crate::services::permission::PermissionGate;
use crate::services::realtime::RealtimeHub;
use crate::storage::{ConversationRepo, FollowRepo, MessageRepo};
use bytes::Bytes;
use opentelemetry::{
    KeyValue, global,
    metrics::{Counter, Histogram},
};
use std::sync::Arc;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Clone, Debug)]
struct Metrics {
    sent_total: Counter<u64>,
    conversations_created_total: Counter<u64>,
    history_batch_size: Histogram<u64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("cove-messaging");
        Self {
            sent_total: meter
                .u64_counter("cove_messages_sent_total")
                .with_description("Total messages successfully sent")
                .build(),
            conversations_created_total: meter
                .u64_counter("cove_conversations_created_total")
                .with_description("Total conversations created")
                .build(),
            history_batch_size: meter
                .u64_histogram("cove_message_history_batch_size")
                .with_description("Number of messages returned by a history fetch")
                .build(),
        }
    }
}

/// Stateless read/write operations against the persistent store.
///
/// Every mutation here is one request/response pair; the client-resident
/// inbox layers its reconciliation on top.
#[derive(Clone)]
pub struct MessagingService {
    conversations: Arc<dyn ConversationRepo>,
    messages: Arc<dyn MessageRepo>,
    follows: Arc<dyn FollowRepo>,
    gate: PermissionGate,
    attachments: AttachmentService,
    hub: RealtimeHub,
    config: MessagingConfig,
    metrics: Metrics,
}

impl MessagingService {
    #[must_use]
    pub fn new(
        conversations: Arc<dyn ConversationRepo>,
        messages: Arc<dyn MessageRepo>,
        follows: Arc<dyn FollowRepo>,
        gate: PermissionGate,
        attachments: AttachmentService,
        hub: RealtimeHub,
        config: MessagingConfig,
    ) -> Self {
        Self { conversations, messages, follows, gate, attachments, hub, config, metrics: Metrics::new() }
    }

    /// Lists the actor's conversations, most recently active first.
    ///
    /// # Errors
    /// Returns `AppError::Store` if the store is unreachable.
    #[tracing::instrument(err(level = "warn"), skip(self), fields(actor = %actor_id))]
    pub async fn list_conversations(&self, actor_id: Uuid) -> Result<Vec<ConversationSummary>> {
        self.conversations.list_for_actor(actor_id).await
    }

    /// Canonical message history for a conversation, ascending by sent time.
    ///
    /// # Errors
    /// Returns `AppError::NotFound` if the conversation does not exist.
    #[tracing::instrument(err(level = "warn"), skip(self), fields(conversation = %conversation_id))]
    pub async fn list_messages(&self, conversation_id: Uuid) -> Result<Vec<Message>> {
        if self.conversations.get(conversation_id).await?.is_none() {
            return Err(AppError::NotFound);
        }

        let messages = self.messages.list_for_conversation(conversation_id).await?;
        self.metrics.history_batch_size.record(messages.len() as u64, &[]);

        Ok(messages)
    }

    /// Inserts a message and publishes the corresponding insert event, which
    /// every subscribed client receives, the sender included.
    ///
    /// # Errors
    /// Returns `AppError::BadRequest` when the trimmed text is empty and no
    /// attachment is present, `AppError::NotFound` if the conversation does
    /// not exist.
    #[tracing::instrument(
        err(level = "warn"),
        skip(self, text, attachment),
        fields(actor = %actor_id, conversation = %conversation_id)
    )]
    pub async fn send(
        &self,
        actor_id: Uuid,
        conversation_id: Uuid,
        text: &str,
        attachment: Option<AttachmentRef>,
    ) -> Result<Message> {
        let content = text.trim();
        if content.is_empty() && attachment.is_none() {
            return Err(AppError::BadRequest("message text must not be empty".to_string()));
        }

        if self.conversations.get(conversation_id).await?.is_none() {
            return Err(AppError::NotFound);
        }

        let now = OffsetDateTime::now_utc();
        let message = Message {
            id: Uuid::new_v4(),
            conversation_id,
            sender_id: actor_id,
            content: (!content.is_empty()).then(|| content.to_string()),
            media_url: attachment.as_ref().map(|a| a.url.clone()),
            media_kind: attachment.as_ref().map(|a| a.kind),
            sent_at: now,
            is_read: false,
        };

        match self.messages.insert(&message).await {
            Ok(()) => {
                self.metrics.sent_total.add(1, &[KeyValue::new("status", "success")]);
            }
            Err(e) => {
                self.metrics.sent_total.add(1, &[KeyValue::new("status", "failure")]);
                return Err(e);
            }
        }

        self.conversations.touch_last_message(conversation_id, now).await?;
        self.hub.publish(PushEvent::message_inserted(message.clone()));

        tracing::debug!(message = %message.id, "Message stored");
        Ok(message)
    }

    /// Marks every message in the conversation not sent by the actor as read
    /// and advances the actor's `last_read_at`.
    ///
    /// The two steps are deliberately non-atomic; a half-failed outcome is
    /// reported rather than retried and self-heals on the next call.
    ///
    /// # Errors
    /// Returns `AppError::NotFound` if the conversation does not exist.
    #[tracing::instrument(err(level = "warn"), skip(self), fields(conversation = %conversation_id, actor = %actor_id))]
    pub async fn mark_read(&self, conversation_id: Uuid, actor_id: Uuid) -> Result<MarkReadOutcome> {
        if self.conversations.get(conversation_id).await?.is_none() {
            return Err(AppError::NotFound);
        }

        let messages_updated = match self.messages.mark_read_excluding_sender(conversation_id, actor_id).await
        {
            Ok(count) => {
                tracing::debug!(count, "Messages marked read");
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to mark messages read");
                false
            }
        };

        let timestamp_updated =
            match self.conversations.advance_last_read(conversation_id, actor_id, OffsetDateTime::now_utc()).await
            {
                Ok(updated) => updated,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to advance last_read_at");
                    false
                }
            };

        Ok(MarkReadOutcome { messages_updated, timestamp_updated })
    }

    /// Opens (or reuses) the direct conversation between two actors.
    ///
    /// The permission gate runs first and a denial leaves no rows behind.
    /// If a conversation with exactly this pair already exists the initial
    /// text is appended to it instead of creating a duplicate.
    ///
    /// # Errors
    /// Returns `AppError::NotPermitted` when no follow edge connects the two
    /// actors, `AppError::BadRequest` when the initial text is empty.
    #[tracing::instrument(
        err(level = "warn"),
        skip(self, initial_text),
        fields(actor = %actor_id, recipient = %recipient_id)
    )]
    pub async fn create_conversation(
        &self,
        actor_id: Uuid,
        recipient_id: Uuid,
        initial_text: &str,
    ) -> Result<Conversation> {
        self.gate.can_message(actor_id, recipient_id).await?;

        if let Some(existing) = self.conversations.find_direct(actor_id, recipient_id).await? {
            tracing::debug!(conversation = %existing.id, "Reusing existing conversation");
            self.send(actor_id, existing.id, initial_text, None).await?;
            return Ok(existing);
        }

        // Validate before creating so a rejected initial message does not
        // leave an empty conversation behind.
        if initial_text.trim().is_empty() {
            return Err(AppError::BadRequest("message text must not be empty".to_string()));
        }

        let conversation = self.conversations.create_direct(actor_id, recipient_id).await?;
        self.metrics.conversations_created_total.add(1, &[]);

        self.send(actor_id, conversation.id, initial_text, None).await?;

        tracing::info!(conversation = %conversation.id, "Conversation created");
        Ok(conversation)
    }

    /// Searches the actor's follow neighborhood by case-insensitive substring
    /// on display name or handle. Bounded by the configured result cap.
    ///
    /// # Errors
    /// Returns `AppError::Store` if the follow graph cannot be read.
    #[tracing::instrument(err(level = "warn"), skip(self, query), fields(actor = %actor_id))]
    pub async fn search_messageable_users(&self, actor_id: Uuid, query: &str) -> Result<Vec<SearchResult>> {
        let needle = query.trim().to_lowercase();

        let mut results: Vec<SearchResult> = self
            .follows
            .neighborhood(actor_id)
            .await?
            .into_iter()
            .filter(|p| {
                p.display_name.to_lowercase().contains(&needle) || p.handle.to_lowercase().contains(&needle)
            })
            .map(|p| SearchResult {
                user_id: p.id,
                display_name: p.display_name,
                handle: p.handle,
                avatar_url: p.avatar_url,
            })
            .collect();

        results.truncate(usize::try_from(self.config.search_limit).unwrap_or(10));
        Ok(results)
    }

    /// Hard-deletes a conversation, cascading to participants and messages.
    ///
    /// # Errors
    /// Returns `AppError::NotFound` if the conversation does not exist.
    #[tracing::instrument(err(level = "warn"), skip(self), fields(conversation = %conversation_id))]
    pub async fn delete_conversation(&self, conversation_id: Uuid) -> Result<()> {
        if self.conversations.delete(conversation_id).await? {
            tracing::info!("Conversation deleted");
            Ok(())
        } else {
            Err(AppError::NotFound)
        }
    }

    /// Uploads an attachment for use in a later `send`.
    ///
    /// # Errors
    /// Returns `AppError::NotFound` if the conversation does not exist, plus
    /// the attachment pipeline's `UploadTooLarge`/`UploadFailed`.
    #[tracing::instrument(
        err(level = "warn"),
        skip(self, bytes),
        fields(actor = %actor_id, conversation = %conversation_id)
    )]
    pub async fn upload_attachment(
        &self,
        actor_id: Uuid,
        conversation_id: Uuid,
        filename: &str,
        content_type: &str,
        bytes: Bytes,
    ) -> Result<AttachmentRef> {
        if self.conversations.get(conversation_id).await?.is_none() {
            return Err(AppError::NotFound);
        }

        self.attachments.upload(actor_id, conversation_id, filename, content_type, bytes).await
    }
}

impl std::fmt::Debug for MessagingService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessagingService").finish_non_exhaustive()
    }
}
