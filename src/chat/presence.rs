//! Presence events.

use serde::Serialize;

use super::event::ServerEvent;
use crate::db::PublicUser;

/// Online status of a room member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Presence {
    /// Joined the room.
    Online,
    /// Left the room.
    Offline,
}

impl Presence {
    /// Get string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Presence::Online => "online",
            Presence::Offline => "offline",
        }
    }
}

impl std::fmt::Display for Presence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Build the `online_status` event announcing `user`'s transition.
pub fn presence_event(user: PublicUser, status: Presence) -> ServerEvent {
    ServerEvent::OnlineStatus {
        online_users: vec![user],
        status,
    }
}
