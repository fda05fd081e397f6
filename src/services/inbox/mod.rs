pub mod session;

use crate::domain::{ConversationSummary, MarkReadOutcome, Message};
use uuid::Uuid;

/// Load state of the selected conversation's history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageState {
    Unloaded,
    Loading,
    Loaded,
}

/// Closed set of events the inbox reducer understands. Pulled snapshots and
/// pushed inserts arrive through the same funnel, which makes the
/// reconciliation rules testable without a network.
#[derive(Debug, Clone)]
pub enum InboxEvent {
    /// A fresh `list_conversations` snapshot.
    SnapshotLoaded(Vec<ConversationSummary>),
    /// The user selected a conversation (or cleared the selection).
    SelectionChanged(Option<Uuid>),
    /// A `list_messages` response. Stale tokens are dropped.
    MessagesLoaded { token: u64, messages: Vec<Message> },
    /// A pushed row-insert, or the sender's own copy of a just-sent message.
    MessageInserted(Message),
    /// The server confirmed (or half-confirmed) a mark-read.
    MarkReadCompleted { conversation_id: Uuid, outcome: MarkReadOutcome },
}

/// Work the reducer cannot do itself and hands back to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Followup {
    /// The new selection needs its history pulled.
    LoadMessages { conversation_id: Uuid, token: u64 },
    /// A pushed insert referenced a conversation this client has never
    /// listed. The event payload has no participant profile, so the summary
    /// cannot be synthesized; re-pull the whole list instead.
    RefreshConversations,
}

/// Client-resident working set of conversations and the active history.
///
/// All mutation goes through [`Inbox::apply`]; the session serializes the
/// three mutation origins (user actions, push events, unread polling) onto
/// it through one event loop.
#[derive(Debug)]
pub struct Inbox {
    actor_id: Uuid,
    summaries: Vec<ConversationSummary>,
    selected: Option<Uuid>,
    selection_seq: u64,
    message_state: MessageState,
    messages: Vec<Message>,
}

impl Inbox {
    #[must_use]
    pub const fn new(actor_id: Uuid) -> Self {
        Self {
            actor_id,
            summaries: Vec::new(),
            selected: None,
            selection_seq: 0,
            message_state: MessageState::Unloaded,
            messages: Vec::new(),
        }
    }

    #[must_use]
    pub fn summaries(&self) -> &[ConversationSummary] {
        &self.summaries
    }

    #[must_use]
    pub const fn selected(&self) -> Option<Uuid> {
        self.selected
    }

    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    #[must_use]
    pub const fn message_state(&self) -> MessageState {
        self.message_state
    }

    /// Derived unread counter; never stored, always recomputed.
    #[must_use]
    pub fn unread_count(&self) -> usize {
        self.summaries.iter().filter(|s| !s.conversation.is_read).count()
    }

    /// Applies one event and returns any follow-up work for the session.
    pub fn apply(&mut self, event: InboxEvent) -> Option<Followup> {
        match event {
            InboxEvent::SnapshotLoaded(summaries) => {
                self.summaries = summaries;
                None
            }
            InboxEvent::SelectionChanged(selection) => self.change_selection(selection),
            InboxEvent::MessagesLoaded { token, messages } => {
                if token != self.selection_seq {
                    tracing::debug!(token, current = self.selection_seq, "Dropping stale history response");
                    return None;
                }
                self.messages = messages;
                self.messages.sort_by(Message::history_order);
                self.message_state = MessageState::Loaded;
                None
            }
            InboxEvent::MessageInserted(message) => self.reconcile_insert(&message),
            InboxEvent::MarkReadCompleted { conversation_id, outcome } => {
                // The optimistic clear from selection time stands either way;
                // a half-failed outcome is left for the next sync to heal.
                if !outcome.complete() {
                    tracing::debug!(conversation = %conversation_id, ?outcome, "Partial mark-read outcome");
                }
                if let Some(summary) = self.summaries.iter_mut().find(|s| s.conversation.id == conversation_id)
                {
                    summary.conversation.is_read = true;
                }
                None
            }
        }
    }

    fn change_selection(&mut self, selection: Option<Uuid>) -> Option<Followup> {
        self.selected = selection;
        self.selection_seq += 1;
        self.messages.clear();

        match selection {
            Some(conversation_id) => {
                self.message_state = MessageState::Loading;
                // Optimistic: the unread indicator clears before the server
                // confirms and is not rolled back on failure.
                if let Some(summary) =
                    self.summaries.iter_mut().find(|s| s.conversation.id == conversation_id)
                {
                    summary.conversation.is_read = true;
                }
                Some(Followup::LoadMessages { conversation_id, token: self.selection_seq })
            }
            None => {
                self.message_state = MessageState::Unloaded;
                None
            }
        }
    }

    /// The central reconciliation rule for pushed inserts (and the sender's
    /// own synchronous copy of a sent message).
    fn reconcile_insert(&mut self, message: &Message) -> Option<Followup> {
        let selected = self.selected == Some(message.conversation_id);

        // 1. Append into the open history, guarding against double insertion
        //    when the same send already returned the row synchronously.
        if selected && !self.messages.iter().any(|m| m.id == message.id) {
            self.messages.push(message.clone());
            self.messages.sort_by(Message::history_order);
        }

        // 2. Recency: the touched conversation moves to the front. A
        //    conversation this client has never listed cannot be synthesized
        //    from the bare event payload.
        let Some(position) = self.summaries.iter().position(|s| s.conversation.id == message.conversation_id)
        else {
            return Some(Followup::RefreshConversations);
        };

        let mut summary = self.summaries.remove(position);
        summary.conversation.last_message_at = message.sent_at;
        summary.last_message = Some(message.clone());

        // 3. A user's own messages never flag their own inbox, and an open
        //    conversation stays read.
        if message.sender_id != self.actor_id && !selected {
            summary.conversation.is_read = false;
        }

        self.summaries.insert(0, summary);
        None
    }
}
