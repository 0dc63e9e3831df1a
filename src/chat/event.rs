//! Wire events exchanged with chat clients.
//!
//! Every frame is a JSON object tagged by `type`. Inbound frames are decoded
//! once into [`ClientEvent`]; unknown tags decode to [`ClientEvent::Unknown`].

use serde::{Deserialize, Serialize};

use super::presence::Presence;
use crate::db::{ChatMessage, PublicUser, UserId};

/// Events sent from client to server.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Post a chat message.
    ChatMessage {
        /// Message content.
        message: String,
        /// Claimed sender.
        #[serde(default)]
        user: Option<UserId>,
    },
    /// Typing indicator.
    Typing {
        /// Who the sender is typing to.
        #[serde(default)]
        receiver: Option<UserId>,
    },
    /// Any other tag.
    #[serde(other)]
    Unknown,
}

impl ClientEvent {
    /// Decode a text frame.
    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// Events sent from server to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// A persisted chat message.
    ChatMessage {
        /// Message content.
        message: String,
        /// Sender.
        user: PublicUser,
        /// ISO 8601 timestamp.
        timestamp: String,
    },
    /// Someone in the room is typing.
    Typing {
        /// Who is typing.
        user: PublicUser,
        /// Who they are typing to.
        receiver: Option<UserId>,
        /// Always true.
        is_typing: bool,
    },
    /// Presence change.
    OnlineStatus {
        /// Users whose status changed.
        online_users: Vec<PublicUser>,
        /// New status.
        status: Presence,
    },
}

impl ServerEvent {
    /// Build the broadcast for a stored message.
    pub fn chat_message(message: &ChatMessage, sender: PublicUser) -> Self {
        Self::ChatMessage {
            message: message.content.clone(),
            user: sender,
            timestamp: message.timestamp_iso(),
        }
    }

    /// Build a typing indicator.
    pub fn typing(user: PublicUser, receiver: Option<UserId>) -> Self {
        Self::Typing {
            user,
            receiver,
            is_typing: true,
        }
    }

    /// Wire name of this event.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ChatMessage { .. } => "chat_message",
            Self::Typing { .. } => "typing",
            Self::OnlineStatus { .. } => "online_status",
        }
    }

    /// Encode as a text frame.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
