//! chathub - real-time conversation rooms over WebSocket.
//!
//! Clients connect to `/ws/chat/{conversation_id}?token=...`, are
//! authenticated with a signed token, and exchange chat messages, typing
//! indicators and presence events with everyone else in the conversation.

pub mod auth;
pub mod chat;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod store;
pub mod web;

pub use auth::{issue_token, AuthError, TokenClaims, TokenValidator};
pub use chat::{
    ChatHub, ChatSession, ClientEvent, Outcome, Presence, RejectReason, RoomRegistry, ServerEvent,
    SessionState,
};
pub use config::Config;
pub use db::{
    ChatMessage, Conversation, ConversationRepository, Database, MessageRepository,
    NewConversation, NewUser, PublicUser, User, UserId, UserRepository,
};
pub use error::{HubError, Result};
pub use store::{ConversationStore, IdentityStore, SqliteStore, StoreError};
pub use web::WebServer;
