//! Conversation and persisted message models.

use chrono::{DateTime, SecondsFormat, Utc};

use super::user::UserId;

/// A conversation; one chat room on the wire.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Conversation {
    /// Conversation ID.
    pub id: i64,
    /// Conversation title.
    pub title: String,
    /// Creation timestamp.
    pub created_at: String,
}

/// Data for creating a new conversation.
#[derive(Debug, Clone, Default)]
pub struct NewConversation {
    /// Conversation title.
    pub title: String,
}

impl NewConversation {
    /// Create a new conversation with a title.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
        }
    }
}

/// A persisted chat message.
#[derive(Debug, Clone)]
pub struct ChatMessage {
    /// Message ID.
    pub id: i64,
    /// Conversation the message belongs to.
    pub conversation_id: i64,
    /// Sender's user ID.
    pub sender_id: UserId,
    /// Message content.
    pub content: String,
    /// When the message was stored.
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    /// ISO-8601 rendering of the timestamp used on the wire.
    pub fn timestamp_iso(&self) -> String {
        self.timestamp.to_rfc3339_opts(SecondsFormat::Micros, false)
    }
}

/// Database row type for ChatMessage.
#[derive(sqlx::FromRow)]
pub(super) struct ChatMessageRow {
    pub id: i64,
    pub conversation_id: i64,
    pub sender_id: i64,
    pub content: String,
    pub timestamp: String,
}

impl From<ChatMessageRow> for ChatMessage {
    fn from(row: ChatMessageRow) -> Self {
        let timestamp = DateTime::parse_from_rfc3339(&row.timestamp)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());

        Self {
            id: row.id,
            conversation_id: row.conversation_id,
            sender_id: UserId(row.sender_id),
            content: row.content,
            timestamp,
        }
    }
}
