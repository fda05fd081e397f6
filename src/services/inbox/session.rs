use crate::config::RealtimeConfig;
use crate::domain::{AttachmentRef, Conversation, MESSAGES_TABLE, Message, SearchResult};
use crate::error::{AppError, Result};
use crate::services::inbox::{Followup, Inbox, InboxEvent};
use crate::services::messaging_service::MessagingService;
use crate::services::realtime::{EventListener, ListenerSignal, RealtimeHub};
use bytes::Bytes;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

/// One authenticated client session over the inbox.
///
/// Mutation has three concurrent origins (user actions, the push listener,
/// the unread poll) but they are serialized here: everything funnels through
/// [`Inbox::apply`] on this single task. Suspension points are the gateway
/// calls; no timeouts are imposed on them, so a hung request leaves the
/// selection in `Loading` until a newer selection supersedes it.
pub struct InboxSession {
    actor_id: Uuid,
    inbox: Inbox,
    gateway: MessagingService,
    listener: EventListener,
    signals: mpsc::Receiver<ListenerSignal>,
    shutdown_rx: watch::Receiver<bool>,
    poll_interval: Duration,
}

impl InboxSession {
    /// Opens a session for the authenticated actor, including the one
    /// push-event subscription this session is allowed to hold.
    ///
    /// # Errors
    /// Returns `AppError::NotAuthenticated` when the host supplies no actor,
    /// `AppError::EventChannelDropped` when the hub is already closed.
    pub fn open(
        actor: Option<Uuid>,
        gateway: MessagingService,
        hub: &RealtimeHub,
        config: &RealtimeConfig,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Result<Self> {
        let actor_id = actor.ok_or(AppError::NotAuthenticated)?;

        let (tx, signals) = mpsc::channel(config.event_buffer_size);
        let listener = EventListener::spawn(hub.clone(), tx)?;

        Ok(Self {
            actor_id,
            inbox: Inbox::new(actor_id),
            gateway,
            listener,
            signals,
            shutdown_rx,
            poll_interval: Duration::from_secs(config.unread_poll_interval_secs),
        })
    }

    #[must_use]
    pub const fn actor_id(&self) -> Uuid {
        self.actor_id
    }

    #[must_use]
    pub const fn inbox(&self) -> &Inbox {
        &self.inbox
    }

    #[must_use]
    pub fn unread_count(&self) -> usize {
        self.inbox.unread_count()
    }

    /// Pulls the initial conversation snapshot. A failure degrades to an
    /// empty list; a later refresh or push event recovers.
    #[tracing::instrument(skip(self), fields(actor = %self.actor_id))]
    pub async fn bootstrap(&mut self) {
        match self.gateway.list_conversations(self.actor_id).await {
            Ok(summaries) => {
                self.inbox.apply(InboxEvent::SnapshotLoaded(summaries));
            }
            Err(e) => {
                tracing::warn!(error = %e, "Bootstrap snapshot failed, starting empty");
                self.inbox.apply(InboxEvent::SnapshotLoaded(Vec::new()));
            }
        }
    }

    /// Re-pulls the conversation list. Unlike bootstrap, a failure keeps the
    /// previous snapshot; worst case is a stale list.
    async fn refresh_conversations(&mut self) {
        match self.gateway.list_conversations(self.actor_id).await {
            Ok(summaries) => {
                self.inbox.apply(InboxEvent::SnapshotLoaded(summaries));
            }
            Err(e) => {
                tracing::warn!(error = %e, "Conversation refresh failed, keeping cached list");
            }
        }
    }

    /// Selects a conversation, pulls its history, then marks it read. The
    /// unread indicator clears optimistically and is not rolled back if the
    /// mark-read half fails.
    #[tracing::instrument(skip(self), fields(actor = %self.actor_id, conversation = ?selection))]
    pub async fn select(&mut self, selection: Option<Uuid>) {
        let Some(Followup::LoadMessages { conversation_id, token }) =
            self.inbox.apply(InboxEvent::SelectionChanged(selection))
        else {
            return;
        };

        match self.gateway.list_messages(conversation_id).await {
            Ok(messages) => {
                self.inbox.apply(InboxEvent::MessagesLoaded { token, messages });
            }
            Err(e) => {
                // Left in Loading; a newer selection supersedes it.
                tracing::warn!(error = %e, "History fetch failed");
                return;
            }
        }

        match self.gateway.mark_read(conversation_id, self.actor_id).await {
            Ok(outcome) => {
                self.inbox.apply(InboxEvent::MarkReadCompleted { conversation_id, outcome });
            }
            Err(e) => {
                tracing::warn!(error = %e, "Mark-read failed, local read state stands");
            }
        }
    }

    /// Sends a message into a conversation. The returned row is reconciled
    /// immediately; the push copy of the same row deduplicates by id.
    ///
    /// # Errors
    /// Surfaces the gateway's structured failure for the host to display.
    pub async fn send(
        &mut self,
        conversation_id: Uuid,
        text: &str,
        attachment: Option<AttachmentRef>,
    ) -> Result<Message> {
        let message = self.gateway.send(self.actor_id, conversation_id, text, attachment).await?;

        if let Some(Followup::RefreshConversations) =
            self.inbox.apply(InboxEvent::MessageInserted(message.clone()))
        {
            self.refresh_conversations().await;
        }

        Ok(message)
    }

    /// Opens (or reuses) the direct conversation with a recipient.
    ///
    /// # Errors
    /// Surfaces `NotPermitted` and the other gateway failures unchanged.
    pub async fn create_conversation(&mut self, recipient_id: Uuid, initial_text: &str) -> Result<Conversation> {
        let conversation = self.gateway.create_conversation(self.actor_id, recipient_id, initial_text).await?;

        // The event payload for the initial message cannot carry the new
        // counterpart's profile, so list instead of synthesizing.
        self.refresh_conversations().await;

        Ok(conversation)
    }

    /// Deletes a conversation and drops it from the local working set.
    ///
    /// # Errors
    /// Returns `AppError::NotFound` if it was already gone.
    pub async fn delete_conversation(&mut self, conversation_id: Uuid) -> Result<()> {
        self.gateway.delete_conversation(conversation_id).await?;

        if self.inbox.selected() == Some(conversation_id) {
            self.inbox.apply(InboxEvent::SelectionChanged(None));
        }
        self.refresh_conversations().await;

        Ok(())
    }

    /// Searches messageable users; read path, degrades to empty on failure.
    pub async fn search(&self, query: &str) -> Vec<SearchResult> {
        match self.gateway.search_messageable_users(self.actor_id, query).await {
            Ok(results) => results,
            Err(e) => {
                tracing::warn!(error = %e, "User search failed");
                Vec::new()
            }
        }
    }

    /// Uploads an attachment for a later [`InboxSession::send`].
    ///
    /// # Errors
    /// Surfaces `UploadTooLarge`/`UploadFailed` for the host to display.
    pub async fn upload_attachment(
        &self,
        conversation_id: Uuid,
        filename: &str,
        content_type: &str,
        bytes: Bytes,
    ) -> Result<AttachmentRef> {
        self.gateway
            .upload_attachment(self.actor_id, conversation_id, filename, content_type, bytes)
            .await
    }

    /// Applies one listener signal.
    pub async fn handle_signal(&mut self, signal: ListenerSignal) {
        match signal {
            ListenerSignal::Event(event) => {
                // The channel carries every insert for the table; filtering
                // is the client's job.
                if event.table != MESSAGES_TABLE {
                    return;
                }
                if let Some(Followup::RefreshConversations) =
                    self.inbox.apply(InboxEvent::MessageInserted(event.row))
                {
                    self.refresh_conversations().await;
                }
            }
            ListenerSignal::Resync => {
                // Events may have been missed while the channel was down;
                // the pull endpoints are the source of truth.
                self.refresh_conversations().await;
                if let Some(selected) = self.inbox.selected() {
                    self.select(Some(selected)).await;
                }
            }
        }
    }

    /// Drains every already-queued listener signal without blocking. Useful
    /// for hosts that drive the session from their own loop.
    pub async fn process_pending(&mut self) {
        while let Ok(signal) = self.signals.try_recv() {
            self.handle_signal(signal).await;
        }
    }

    /// Runs the session event loop until shutdown or sign-out.
    #[tracing::instrument(name = "inbox_session", skip(self), fields(actor = %self.actor_id))]
    pub async fn run(&mut self) {
        let mut poll = tokio::time::interval(self.poll_interval);
        poll.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The first tick fires immediately; bootstrap covers that pull.
        poll.tick().await;
        self.bootstrap().await;

        loop {
            tokio::select! {
                biased;

                changed = self.shutdown_rx.changed() => {
                    if changed.is_err() || *self.shutdown_rx.borrow() {
                        tracing::info!("Session shutting down");
                        break;
                    }
                }

                signal = self.signals.recv() => {
                    match signal {
                        Some(signal) => self.handle_signal(signal).await,
                        None => {
                            tracing::info!("Listener queue closed");
                            break;
                        }
                    }
                }

                _ = poll.tick() => {
                    self.refresh_conversations().await;
                }
            }
        }

        self.listener.abort();
    }

    /// Tears the session down at sign-out, closing its subscription.
    pub fn close(self) {
        self.listener.abort();
    }
}

impl std::fmt::Debug for InboxSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InboxSession").field("actor_id", &self.actor_id).finish_non_exhaustive()
    }
}
