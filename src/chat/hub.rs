//! Shared dependencies of every chat connection.

use std::sync::Arc;
use std::time::Duration;

use super::registry::RoomRegistry;
use crate::auth::TokenValidator;
use crate::config::Config;
use crate::store::{ConversationStore, IdentityStore, SqliteStore};

/// Everything a connection task needs, shared through an `Arc`.
pub struct ChatHub {
    registry: Arc<RoomRegistry>,
    validator: TokenValidator,
    identities: Arc<dyn IdentityStore>,
    conversations: Arc<dyn ConversationStore>,
    group_prefix: String,
    idle_timeout: Option<Duration>,
}

impl ChatHub {
    /// Create a hub with a fresh registry.
    pub fn new(
        validator: TokenValidator,
        identities: Arc<dyn IdentityStore>,
        conversations: Arc<dyn ConversationStore>,
    ) -> Self {
        Self {
            registry: Arc::new(RoomRegistry::new()),
            validator,
            identities,
            conversations,
            group_prefix: "chat_".to_string(),
            idle_timeout: None,
        }
    }

    /// Build a hub from configuration, backed by one SQLite store.
    pub fn from_config(config: &Config, store: SqliteStore) -> Self {
        let store = Arc::new(store);
        let idle = config.chat.idle_timeout_secs;

        Self::new(
            TokenValidator::new(&config.auth.jwt_secret),
            store.clone(),
            store,
        )
        .with_registry(Arc::new(RoomRegistry::with_capacity(
            config.chat.channel_capacity,
        )))
        .with_group_prefix(&config.chat.group_prefix)
        .with_idle_timeout((idle > 0).then(|| Duration::from_secs(idle)))
    }

    /// Use an existing registry.
    pub fn with_registry(mut self, registry: Arc<RoomRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// Set the group name prefix.
    pub fn with_group_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.group_prefix = prefix.into();
        self
    }

    /// Set the idle timeout for joined connections.
    pub fn with_idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Group name for a conversation.
    pub fn group_name(&self, conversation_ref: &str) -> String {
        format!("{}{}", self.group_prefix, conversation_ref)
    }

    /// The room registry.
    pub fn registry(&self) -> &Arc<RoomRegistry> {
        &self.registry
    }

    /// The token validator.
    pub fn validator(&self) -> &TokenValidator {
        &self.validator
    }

    /// The identity store.
    pub fn identities(&self) -> &dyn IdentityStore {
        self.identities.as_ref()
    }

    /// The conversation store.
    pub fn conversations(&self) -> &dyn ConversationStore {
        self.conversations.as_ref()
    }

    /// Idle timeout for joined connections, if any.
    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout
    }
}
