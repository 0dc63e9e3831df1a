//! Storage adapters consumed by the chat hub.
//!
//! The hub never touches the database directly; it talks to an
//! [`IdentityStore`] and a [`ConversationStore`]. [`SqliteStore`] implements
//! both on top of [`Database`].

use async_trait::async_trait;
use thiserror::Error;

use crate::db::{
    ChatMessage, Conversation, ConversationRepository, Database, MessageRepository, User, UserId,
    UserRepository,
};
use crate::HubError;

/// Error returned by storage adapters.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The referenced record does not exist.
    #[error("{0} not found")]
    NotFound(String),

    /// The backing store failed.
    #[error("store backend error: {0}")]
    Backend(String),
}

impl From<HubError> for StoreError {
    fn from(e: HubError) -> Self {
        match e {
            HubError::NotFound(what) => StoreError::NotFound(what),
            other => StoreError::Backend(other.to_string()),
        }
    }
}

/// Resolves identity references to user records.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Fetch a user by ID.
    async fn fetch_by_id(&self, id: UserId) -> Result<User, StoreError>;
}

/// Resolves conversations and appends persisted messages.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Fetch a conversation by its reference as it appears in the URL.
    async fn fetch_by_id(&self, conversation_ref: &str) -> Result<Conversation, StoreError>;

    /// Persist a message sent by `sender` to `conversation`.
    async fn append_message(
        &self,
        conversation: &Conversation,
        sender: &User,
        content: &str,
    ) -> Result<ChatMessage, StoreError>;
}

/// SQLite-backed implementation of both adapters.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    db: Database,
}

impl SqliteStore {
    /// Wrap an open database.
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Access the underlying database.
    pub fn database(&self) -> &Database {
        &self.db
    }
}

#[async_trait]
impl IdentityStore for SqliteStore {
    async fn fetch_by_id(&self, id: UserId) -> Result<User, StoreError> {
        UserRepository::new(self.db.pool())
            .get_by_id(id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("user {id}")))
    }
}

#[async_trait]
impl ConversationStore for SqliteStore {
    async fn fetch_by_id(&self, conversation_ref: &str) -> Result<Conversation, StoreError> {
        let id: i64 = conversation_ref
            .parse()
            .map_err(|_| StoreError::NotFound(format!("conversation {conversation_ref}")))?;

        ConversationRepository::new(self.db.pool())
            .get_by_id(id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("conversation {conversation_ref}")))
    }

    async fn append_message(
        &self,
        conversation: &Conversation,
        sender: &User,
        content: &str,
    ) -> Result<ChatMessage, StoreError> {
        let message = MessageRepository::new(self.db.pool())
            .append(conversation.id, sender.id, content)
            .await?;
        Ok(message)
    }
}
