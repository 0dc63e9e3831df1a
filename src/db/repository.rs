//! Repositories for users, conversations and messages.

use chrono::{SecondsFormat, Utc};

use super::conversation::{ChatMessage, ChatMessageRow, Conversation, NewConversation};
use super::user::{NewUser, User, UserId};
use super::DbPool;
use crate::{HubError, Result};

/// Repository for user operations.
pub struct UserRepository<'a> {
    pool: &'a DbPool,
}

impl<'a> UserRepository<'a> {
    /// Create a new UserRepository with the given database pool reference.
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    /// Create a new user in the database.
    pub async fn create(&self, new_user: &NewUser) -> Result<User> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO users (username, display_name, email) VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(&new_user.username)
        .bind(&new_user.display_name)
        .bind(&new_user.email)
        .fetch_one(self.pool)
        .await
        .map_err(|e| HubError::Database(e.to_string()))?;

        self.get_by_id(UserId(id))
            .await?
            .ok_or_else(|| HubError::NotFound("user".to_string()))
    }

    /// Get a user by ID.
    pub async fn get_by_id(&self, id: UserId) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, username, display_name, email, created_at FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| HubError::Database(e.to_string()))?;

        Ok(user)
    }
}

/// Repository for conversation operations.
pub struct ConversationRepository<'a> {
    pool: &'a DbPool,
}

impl<'a> ConversationRepository<'a> {
    /// Create a new ConversationRepository with the given database pool reference.
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    /// Create a new conversation.
    pub async fn create(&self, new_conversation: &NewConversation) -> Result<Conversation> {
        let id: i64 =
            sqlx::query_scalar("INSERT INTO conversations (title) VALUES ($1) RETURNING id")
                .bind(&new_conversation.title)
                .fetch_one(self.pool)
                .await
                .map_err(|e| HubError::Database(e.to_string()))?;

        self.get_by_id(id)
            .await?
            .ok_or_else(|| HubError::NotFound("conversation".to_string()))
    }

    /// Get a conversation by ID.
    pub async fn get_by_id(&self, id: i64) -> Result<Option<Conversation>> {
        let conversation = sqlx::query_as::<_, Conversation>(
            "SELECT id, title, created_at FROM conversations WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| HubError::Database(e.to_string()))?;

        Ok(conversation)
    }
}

/// Repository for persisted chat messages.
pub struct MessageRepository<'a> {
    pool: &'a DbPool,
}

impl<'a> MessageRepository<'a> {
    /// Create a new MessageRepository with the given database pool reference.
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    /// Append a message to a conversation, stamped with the current time.
    pub async fn append(
        &self,
        conversation_id: i64,
        sender_id: UserId,
        content: &str,
    ) -> Result<ChatMessage> {
        let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false);

        let row = sqlx::query_as::<_, ChatMessageRow>(
            r#"
            INSERT INTO messages (conversation_id, sender_id, content, timestamp)
            VALUES ($1, $2, $3, $4)
            RETURNING id, conversation_id, sender_id, content, timestamp
            "#,
        )
        .bind(conversation_id)
        .bind(sender_id)
        .bind(content)
        .bind(&timestamp)
        .fetch_one(self.pool)
        .await
        .map_err(|e| HubError::Database(e.to_string()))?;

        Ok(row.into())
    }

    /// Count messages in a conversation.
    pub async fn count(&self, conversation_id: i64) -> Result<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM messages WHERE conversation_id = $1")
                .bind(conversation_id)
                .fetch_one(self.pool)
                .await
                .map_err(|e| HubError::Database(e.to_string()))?;
        Ok(count)
    }
}
