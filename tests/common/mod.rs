// Each integration binary compiles this module separately and uses a
// different slice of it.
#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use cove_messaging::config::{MessagingConfig, RealtimeConfig, StorageConfig};
use cove_messaging::domain::{Conversation, ConversationSummary, Message, Participant, Profile};
use cove_messaging::error::{AppError, Result};
use cove_messaging::services::attachment_service::AttachmentService;
use cove_messaging::services::inbox::session::InboxSession;
use cove_messaging::services::messaging_service::MessagingService;
use cove_messaging::services::permission::PermissionGate;
use cove_messaging::services::realtime::RealtimeHub;
use cove_messaging::storage::{BlobStore, ConversationRepo, FollowRepo, MessageRepo};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use time::OffsetDateTime;
use tokio::sync::watch;
use uuid::Uuid;

pub fn setup_tracing() {
    cove_messaging::telemetry::init_test_telemetry();
}

#[derive(Default)]
struct StoreState {
    profiles: HashMap<Uuid, Profile>,
    follows: HashSet<(Uuid, Uuid)>,
    conversations: HashMap<Uuid, Conversation>,
    participants: Vec<Participant>,
    messages: Vec<Message>,
}

/// In-memory stand-in for the persistent store and the identity service,
/// implementing all three repo ports behind one mutex.
#[derive(Default)]
pub struct MemStore {
    state: Mutex<StoreState>,
    /// Failure injection for the two mark-read halves.
    pub fail_mark_messages: AtomicBool,
    pub fail_advance_read: AtomicBool,
}

impl MemStore {
    pub fn add_profile(&self, display_name: &str, handle: &str) -> Uuid {
        let id = Uuid::new_v4();
        let profile =
            Profile { id, display_name: display_name.to_string(), handle: handle.to_string(), avatar_url: None };
        self.state.lock().unwrap().profiles.insert(id, profile);
        id
    }

    pub fn add_follow(&self, follower: Uuid, followee: Uuid) {
        self.state.lock().unwrap().follows.insert((follower, followee));
    }

    pub fn remove_follow(&self, follower: Uuid, followee: Uuid) {
        self.state.lock().unwrap().follows.remove(&(follower, followee));
    }

    pub fn conversation_count(&self) -> usize {
        self.state.lock().unwrap().conversations.len()
    }

    pub fn participant_count(&self) -> usize {
        self.state.lock().unwrap().participants.len()
    }

    pub fn message_count(&self) -> usize {
        self.state.lock().unwrap().messages.len()
    }

    pub fn last_read_at(&self, conversation_id: Uuid, user_id: Uuid) -> Option<OffsetDateTime> {
        self.state
            .lock()
            .unwrap()
            .participants
            .iter()
            .find(|p| p.conversation_id == conversation_id && p.user_id == user_id)
            .map(|p| p.last_read_at)
    }

    fn injected_failure() -> AppError {
        AppError::Store(sqlx::Error::PoolClosed)
    }
}

#[async_trait]
impl ConversationRepo for MemStore {
    async fn create_direct(&self, actor_id: Uuid, recipient_id: Uuid) -> Result<Conversation> {
        let mut state = self.state.lock().unwrap();
        let now = OffsetDateTime::now_utc();
        let conversation =
            Conversation { id: Uuid::new_v4(), created_at: now, last_message_at: now, is_read: true };

        for user_id in [actor_id, recipient_id] {
            let profile =
                state.profiles.get(&user_id).cloned().ok_or(AppError::Store(sqlx::Error::RowNotFound))?;
            state.participants.push(Participant {
                id: Uuid::new_v4(),
                conversation_id: conversation.id,
                user_id,
                joined_at: now,
                last_read_at: now,
                profile,
            });
        }

        state.conversations.insert(conversation.id, conversation.clone());
        Ok(conversation)
    }

    async fn find_direct(&self, actor_id: Uuid, recipient_id: Uuid) -> Result<Option<Conversation>> {
        let state = self.state.lock().unwrap();
        let found = state.conversations.values().find(|c| {
            let members: Vec<Uuid> = state
                .participants
                .iter()
                .filter(|p| p.conversation_id == c.id)
                .map(|p| p.user_id)
                .collect();
            members.contains(&actor_id) && members.contains(&recipient_id)
        });
        Ok(found.cloned())
    }

    async fn get(&self, conversation_id: Uuid) -> Result<Option<Conversation>> {
        Ok(self.state.lock().unwrap().conversations.get(&conversation_id).cloned())
    }

    async fn list_for_actor(&self, actor_id: Uuid) -> Result<Vec<ConversationSummary>> {
        let state = self.state.lock().unwrap();
        let mut summaries: Vec<ConversationSummary> = state
            .participants
            .iter()
            .filter(|p| p.user_id == actor_id)
            .filter_map(|mine| {
                let conversation = state.conversations.get(&mine.conversation_id)?;
                let other = state
                    .participants
                    .iter()
                    .find(|p| p.conversation_id == mine.conversation_id && p.user_id != actor_id)?;

                let mut in_conversation: Vec<&Message> =
                    state.messages.iter().filter(|m| m.conversation_id == conversation.id).collect();
                in_conversation.sort_by(|a, b| a.history_order(b));

                let last_message = in_conversation.last().map(|m| (*m).clone());
                let has_unread =
                    in_conversation.iter().any(|m| m.sender_id != actor_id && !m.is_read);

                let mut conversation = conversation.clone();
                conversation.is_read = !has_unread;

                Some(ConversationSummary { conversation, other: other.profile.clone(), last_message })
            })
            .collect();

        summaries.sort_by(|a, b| b.conversation.last_message_at.cmp(&a.conversation.last_message_at));
        Ok(summaries)
    }

    async fn touch_last_message(&self, conversation_id: Uuid, at: OffsetDateTime) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(c) = state.conversations.get_mut(&conversation_id) {
            c.last_message_at = at;
            c.is_read = false;
        }
        Ok(())
    }

    async fn advance_last_read(
        &self,
        conversation_id: Uuid,
        actor_id: Uuid,
        at: OffsetDateTime,
    ) -> Result<bool> {
        if self.fail_advance_read.load(Ordering::Relaxed) {
            return Err(Self::injected_failure());
        }

        let mut state = self.state.lock().unwrap();
        let Some(participant) = state
            .participants
            .iter_mut()
            .find(|p| p.conversation_id == conversation_id && p.user_id == actor_id)
        else {
            return Ok(false);
        };

        if participant.last_read_at <= at {
            participant.last_read_at = at;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn delete(&self, conversation_id: Uuid) -> Result<bool> {
        let mut state = self.state.lock().unwrap();
        let existed = state.conversations.remove(&conversation_id).is_some();
        state.participants.retain(|p| p.conversation_id != conversation_id);
        state.messages.retain(|m| m.conversation_id != conversation_id);
        Ok(existed)
    }
}

#[async_trait]
impl MessageRepo for MemStore {
    async fn insert(&self, message: &Message) -> Result<()> {
        self.state.lock().unwrap().messages.push(message.clone());
        Ok(())
    }

    async fn list_for_conversation(&self, conversation_id: Uuid) -> Result<Vec<Message>> {
        let state = self.state.lock().unwrap();
        let mut messages: Vec<Message> =
            state.messages.iter().filter(|m| m.conversation_id == conversation_id).cloned().collect();
        messages.sort_by(Message::history_order);
        Ok(messages)
    }

    async fn mark_read_excluding_sender(&self, conversation_id: Uuid, actor_id: Uuid) -> Result<u64> {
        if self.fail_mark_messages.load(Ordering::Relaxed) {
            return Err(Self::injected_failure());
        }

        let mut state = self.state.lock().unwrap();
        let mut affected = 0;
        for message in state
            .messages
            .iter_mut()
            .filter(|m| m.conversation_id == conversation_id && m.sender_id != actor_id && !m.is_read)
        {
            message.is_read = true;
            affected += 1;
        }
        Ok(affected)
    }
}

#[async_trait]
impl FollowRepo for MemStore {
    async fn edge_exists(&self, a: Uuid, b: Uuid) -> Result<bool> {
        let state = self.state.lock().unwrap();
        Ok(state.follows.contains(&(a, b)) || state.follows.contains(&(b, a)))
    }

    async fn neighborhood(&self, actor_id: Uuid) -> Result<Vec<Profile>> {
        let state = self.state.lock().unwrap();
        let mut seen = HashSet::new();
        let mut profiles = Vec::new();
        for (follower, followee) in &state.follows {
            let other = match (*follower == actor_id, *followee == actor_id) {
                (true, _) => *followee,
                (_, true) => *follower,
                _ => continue,
            };
            if seen.insert(other)
                && let Some(profile) = state.profiles.get(&other)
            {
                profiles.push(profile.clone());
            }
        }
        Ok(profiles)
    }
}

/// Blob store that records puts instead of talking to S3.
#[derive(Default)]
pub struct MemBlobStore {
    pub puts: Mutex<Vec<(String, String, usize)>>,
    pub fail_puts: AtomicBool,
}

#[async_trait]
impl BlobStore for MemBlobStore {
    async fn put(&self, key: &str, content_type: &str, bytes: Bytes) -> Result<String> {
        if self.fail_puts.load(Ordering::Relaxed) {
            return Err(AppError::UploadFailed("injected blob failure".to_string()));
        }
        self.puts.lock().unwrap().push((key.to_string(), content_type.to_string(), bytes.len()));
        Ok(format!("https://blobs.test/{key}"))
    }
}

/// Fully wired subsystem over the in-memory ports.
pub struct TestApp {
    pub store: Arc<MemStore>,
    pub blobs: Arc<MemBlobStore>,
    pub hub: RealtimeHub,
    pub gateway: MessagingService,
    pub realtime_config: RealtimeConfig,
    shutdown_tx: watch::Sender<bool>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_realtime_config(RealtimeConfig::default())
    }

    pub fn with_realtime_config(realtime_config: RealtimeConfig) -> Self {
        setup_tracing();

        let store = Arc::new(MemStore::default());
        let blobs = Arc::new(MemBlobStore::default());
        let hub = RealtimeHub::new(&realtime_config);

        let gate = PermissionGate::new(Arc::clone(&store) as Arc<dyn FollowRepo>);
        let attachments =
            AttachmentService::new(Arc::clone(&blobs) as Arc<dyn BlobStore>, &StorageConfig::default());

        let gateway = MessagingService::new(
            Arc::clone(&store) as Arc<dyn ConversationRepo>,
            Arc::clone(&store) as Arc<dyn MessageRepo>,
            Arc::clone(&store) as Arc<dyn FollowRepo>,
            gate,
            attachments,
            hub.clone(),
            MessagingConfig::default(),
        );

        let (shutdown_tx, _) = watch::channel(false);

        Self { store, blobs, hub, gateway, realtime_config, shutdown_tx }
    }

    /// Registers a profile and returns its id.
    pub fn register_user(&self, display_name: &str, handle: &str) -> Uuid {
        self.store.add_profile(display_name, handle)
    }

    /// Flips the shutdown watch observed by every open session.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Opens a client session for an actor, bootstrapped with the current
    /// conversation snapshot.
    pub async fn open_session(&self, actor: Uuid) -> InboxSession {
        let mut session = InboxSession::open(
            Some(actor),
            self.gateway.clone(),
            &self.hub,
            &self.realtime_config,
            self.shutdown_tx.subscribe(),
        )
        .expect("session open");
        session.bootstrap().await;
        session
    }
}

/// Lets the spawned listener task forward queued events, then drains them
/// into the session.
pub async fn settle(session: &mut InboxSession) {
    tokio::time::sleep(std::time::Duration::from_millis(25)).await;
    session.process_pending().await;
}
