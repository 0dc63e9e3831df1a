//! Connection session state machine.
//!
//! A session is created by [`ChatSession::establish`], which authenticates the
//! credential, joins the conversation's group and announces the user online.
//! Frames received afterwards go through [`ChatSession::on_text`].
//! [`ChatSession::close`] announces the user offline and leaves the group;
//! if a joined session is dropped without being closed, the same cleanup is
//! spawned from `Drop`.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use super::event::{ClientEvent, ServerEvent};
use super::hub::ChatHub;
use super::presence::{presence_event, Presence};
use super::registry::EventReceiver;
use crate::auth::AuthError;
use crate::db::{PublicUser, User, UserId};
use crate::store::StoreError;

/// Lifecycle state of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Transport open, credential not yet inspected.
    Connecting,
    /// Credential being validated.
    Authenticating,
    /// Member of the conversation's group.
    Joined,
    /// Offline announced, membership not yet released.
    Closing,
    /// Gone.
    Closed,
}

/// Why a connection was refused before joining.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// No `token` parameter.
    #[error("no credential")]
    NoCredential,
    /// Token past its expiry.
    #[error("credential expired")]
    Expired,
    /// Token failed verification.
    #[error("credential invalid")]
    Invalid,
    /// Any other failure.
    #[error("unexpected authentication failure")]
    Unexpected,
}

impl RejectReason {
    /// WebSocket close code sent to the client.
    pub fn close_code(&self) -> u16 {
        match self {
            RejectReason::Expired => 4000,
            RejectReason::Invalid => 4001,
            RejectReason::NoCredential => 4002,
            RejectReason::Unexpected => 4003,
        }
    }

    /// Close reason text sent to the client.
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::NoCredential => "no_credential",
            RejectReason::Expired => "expired",
            RejectReason::Invalid => "invalid",
            RejectReason::Unexpected => "unexpected",
        }
    }
}

impl From<AuthError> for RejectReason {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::Expired => RejectReason::Expired,
            AuthError::Malformed => RejectReason::Invalid,
            AuthError::Unknown => RejectReason::Unexpected,
        }
    }
}

/// Failure while handling an inbound frame. Never fatal to the connection.
#[derive(Error, Debug)]
pub enum EventError {
    /// Frame is not a valid event.
    #[error("malformed event: {0}")]
    Decode(#[from] serde_json::Error),
    /// Storage adapter failed or a referenced record is missing.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Frame names a sender other than the authenticated user.
    #[error("sender {claimed} does not match authenticated user {actual}")]
    SenderMismatch {
        /// Sender named in the frame.
        claimed: UserId,
        /// Authenticated user.
        actual: UserId,
    },
}

/// What happened to an inbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Broadcast to this many receivers.
    Broadcast(usize),
    /// Typing indicator addressed to oneself.
    Suppressed,
    /// Unknown event kind.
    Ignored,
    /// Handling failed; the event was dropped.
    Dropped,
}

/// One authenticated connection joined to a conversation.
pub struct ChatSession {
    id: String,
    identity: User,
    public: PublicUser,
    conversation_ref: String,
    group: String,
    state: SessionState,
    hub: Arc<ChatHub>,
}

impl ChatSession {
    /// Authenticate `credential` at time `now` and join `conversation_ref`.
    ///
    /// On success the session is `Joined`, an `online` presence event has been
    /// broadcast, and the returned receiver yields every event of the group
    /// starting with that one.
    pub async fn establish(
        hub: Arc<ChatHub>,
        credential: Option<&str>,
        conversation_ref: &str,
        now: i64,
    ) -> Result<(Self, EventReceiver), RejectReason> {
        let mut state = SessionState::Connecting;
        debug!(?state, conversation = conversation_ref, "connection opened");

        let credential = match credential.map(str::trim) {
            Some(token) if !token.is_empty() => token,
            _ => {
                info!(conversation = conversation_ref, "rejected: no credential");
                return Err(RejectReason::NoCredential);
            }
        };

        state = SessionState::Authenticating;
        debug!(?state, "validating credential");

        let user_id = hub.validator().validate(credential, now).map_err(|e| {
            info!(error = %e, conversation = conversation_ref, "rejected credential");
            RejectReason::from(e)
        })?;

        let identity = hub.identities().fetch_by_id(user_id).await.map_err(|e| {
            warn!(error = %e, %user_id, "rejected: identity lookup failed");
            RejectReason::Unexpected
        })?;

        let id = format!("web-{}-{}", identity.id, uuid::Uuid::new_v4());
        let group = hub.group_name(conversation_ref);
        let public = identity.public();

        let receiver = hub.registry().join(&group, &id).await;
        state = SessionState::Joined;

        hub.registry()
            .broadcast(&group, presence_event(public.clone(), Presence::Online))
            .await;

        info!(
            session_id = %id,
            user_id = %identity.id,
            group = %group,
            "session joined"
        );

        let session = Self {
            id,
            identity,
            public,
            conversation_ref: conversation_ref.to_string(),
            group,
            state,
            hub,
        };
        Ok((session, receiver))
    }

    /// Session ID.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Authenticated user.
    pub fn identity(&self) -> &User {
        &self.identity
    }

    /// Conversation reference from the URL.
    pub fn conversation_ref(&self) -> &str {
        &self.conversation_ref
    }

    /// Group name.
    pub fn group(&self) -> &str {
        &self.group
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Handle a text frame, logging and dropping any failure.
    pub async fn on_text(&self, text: &str) -> Outcome {
        match self.handle_text(text).await {
            Ok(outcome) => outcome,
            Err(EventError::Decode(e)) => {
                debug!(session_id = %self.id, error = %e, "ignoring malformed frame");
                Outcome::Dropped
            }
            Err(e) => {
                warn!(session_id = %self.id, error = %e, "dropping event");
                Outcome::Dropped
            }
        }
    }

    /// Decode and handle a text frame.
    pub async fn handle_text(&self, text: &str) -> Result<Outcome, EventError> {
        match ClientEvent::decode(text)? {
            ClientEvent::ChatMessage { message, user } => self.chat_message(message, user).await,
            ClientEvent::Typing { receiver } => Ok(self.typing(receiver).await),
            ClientEvent::Unknown => Ok(Outcome::Ignored),
        }
    }

    /// Store and relay a chat message.
    ///
    /// The sender is always the authenticated identity. A frame whose `user`
    /// names anyone else is rejected with `SenderMismatch` and nothing is
    /// stored, rather than being recorded under the claimed user.
    async fn chat_message(
        &self,
        content: String,
        claimed: Option<UserId>,
    ) -> Result<Outcome, EventError> {
        let sender_id = claimed.unwrap_or(self.identity.id);
        if sender_id != self.identity.id {
            return Err(EventError::SenderMismatch {
                claimed: sender_id,
                actual: self.identity.id,
            });
        }

        // Storage first; the registry is only touched once the message is stored.
        let sender = self.hub.identities().fetch_by_id(sender_id).await?;
        let conversation = self
            .hub
            .conversations()
            .fetch_by_id(&self.conversation_ref)
            .await?;
        let stored = self
            .hub
            .conversations()
            .append_message(&conversation, &sender, &content)
            .await?;

        let event = ServerEvent::chat_message(&stored, sender.public());
        let delivered = self.hub.registry().broadcast(&self.group, event).await;
        debug!(session_id = %self.id, message_id = stored.id, delivered, "chat message relayed");
        Ok(Outcome::Broadcast(delivered))
    }

    async fn typing(&self, receiver: Option<UserId>) -> Outcome {
        if receiver == Some(self.identity.id) {
            return Outcome::Suppressed;
        }

        let event = ServerEvent::typing(self.public.clone(), receiver);
        Outcome::Broadcast(self.hub.registry().broadcast(&self.group, event).await)
    }

    /// Announce the user offline and leave the group.
    ///
    /// Safe to cancel: whatever has not happened yet is finished from `Drop`.
    pub async fn close(mut self) {
        if self.state == SessionState::Joined {
            announce_offline(&self.hub, &self.group, self.public.clone()).await;
            self.state = SessionState::Closing;
        }
        self.hub.registry().leave(&self.group, &self.id).await;
        self.state = SessionState::Closed;
        info!(session_id = %self.id, group = %self.group, "session closed");
    }
}

impl Drop for ChatSession {
    fn drop(&mut self) {
        let offline = match self.state {
            SessionState::Joined => Some(self.public.clone()),
            SessionState::Closing => None,
            _ => return,
        };
        self.state = SessionState::Closed;

        let hub = Arc::clone(&self.hub);
        let group = self.group.clone();
        let id = self.id.clone();

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                warn!(session_id = %id, "session dropped without close, cleaning up");
                handle.spawn(async move {
                    if let Some(public) = offline {
                        announce_offline(&hub, &group, public).await;
                    }
                    hub.registry().leave(&group, &id).await;
                });
            }
            Err(_) => warn!(session_id = %id, "session dropped outside runtime, cleanup skipped"),
        }
    }
}

async fn announce_offline(hub: &ChatHub, group: &str, public: PublicUser) {
    hub.registry()
        .broadcast(group, presence_event(public, Presence::Offline))
        .await;
}
