use crate::domain::{Conversation, ConversationSummary, Message, Profile};
use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use time::OffsetDateTime;
use uuid::Uuid;

pub mod blob_store;
pub mod conversation_repo;
pub mod follow_repo;
pub mod message_repo;
pub mod records;

pub type DbPool = Pool<Postgres>;

/// Initializes the database connection pool.
///
/// # Errors
/// Returns `AppError::Store` if the database is unreachable.
pub async fn init_pool(database_url: &str) -> Result<DbPool> {
    let pool = PgPoolOptions::new().max_connections(10).connect(database_url).await?;
    Ok(pool)
}

/// Runs the embedded sqlx migrations.
///
/// # Errors
/// Returns `AppError::Store` if a migration fails to apply.
pub async fn run_migrations(pool: &DbPool) -> Result<()> {
    sqlx::migrate!().run(pool).await.map_err(sqlx::Error::from)?;
    Ok(())
}

/// Conversation and participant persistence.
///
/// The persistent relational store owns these rows; this port is the only
/// way the gateway touches them, which keeps the reconciliation logic
/// testable against an in-memory implementation.
#[async_trait]
pub trait ConversationRepo: Send + Sync {
    /// Creates the conversation and both participant rows in one transaction.
    async fn create_direct(&self, actor_id: Uuid, recipient_id: Uuid) -> Result<Conversation>;

    /// Finds an existing direct conversation containing exactly this pair,
    /// by walking the actor's participant rows.
    async fn find_direct(&self, actor_id: Uuid, recipient_id: Uuid) -> Result<Option<Conversation>>;

    async fn get(&self, conversation_id: Uuid) -> Result<Option<Conversation>>;

    /// Summaries for the actor ordered by `last_message_at` descending, with
    /// one last-message lookup per conversation id.
    async fn list_for_actor(&self, actor_id: Uuid) -> Result<Vec<ConversationSummary>>;

    /// Advances `last_message_at` after an insert.
    async fn touch_last_message(&self, conversation_id: Uuid, at: OffsetDateTime) -> Result<()>;

    /// Moves the participant's `last_read_at` forward. Never moves it
    /// backwards; returns whether a row was updated.
    async fn advance_last_read(&self, conversation_id: Uuid, actor_id: Uuid, at: OffsetDateTime)
    -> Result<bool>;

    /// Hard delete, cascading to participants and messages.
    async fn delete(&self, conversation_id: Uuid) -> Result<bool>;
}

/// Message persistence. Messages are immutable except for the read flag.
#[async_trait]
pub trait MessageRepo: Send + Sync {
    async fn insert(&self, message: &Message) -> Result<()>;

    /// Canonical history: ascending `(sent_at, id)`.
    async fn list_for_conversation(&self, conversation_id: Uuid) -> Result<Vec<Message>>;

    /// Flips `is_read` on every message in the conversation not sent by
    /// `actor_id`; returns the number of rows affected.
    async fn mark_read_excluding_sender(&self, conversation_id: Uuid, actor_id: Uuid) -> Result<u64>;
}

/// Follow-graph facts supplied by the identity service.
#[async_trait]
pub trait FollowRepo: Send + Sync {
    /// True iff a follow edge exists between the two actors in either direction.
    async fn edge_exists(&self, a: Uuid, b: Uuid) -> Result<bool>;

    /// Profiles connected to the actor by a follow edge in either direction.
    async fn neighborhood(&self, actor_id: Uuid) -> Result<Vec<Profile>>;
}

/// Blob storage for message attachments.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Stores the object and returns a publicly resolvable URL.
    async fn put(&self, key: &str, content_type: &str, bytes: Bytes) -> Result<String>;
}
