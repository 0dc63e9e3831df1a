//! Room registry for chathub.
//!
//! Maps group names to the sessions currently joined to them. Each group
//! owns a tokio broadcast channel; every member holds a receiver and drains
//! it from its own connection task, so fan-out is parallel across members
//! and first-in-first-out per group. A member that falls behind lags and
//! loses the oldest events instead of stalling the others.
//!
//! Membership for all groups sits behind one `RwLock`. Writers (join and
//! leave) only touch two hash maps and never await while holding it, and
//! `broadcast` holds the read side just long enough to clone the group's
//! sender, so the lock is never held across a send or a socket write.
//! Sharding it per group would not remove the write lock needed to create
//! and collapse groups.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use tokio::sync::{broadcast, RwLock};
use tracing::debug;

use super::event::ServerEvent;

/// Default number of events buffered per group.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Receiving end of a group membership.
pub type EventReceiver = broadcast::Receiver<Arc<ServerEvent>>;

/// A single broadcast group.
struct Group {
    /// Joined session IDs.
    members: BTreeSet<String>,
    /// Broadcast sender for events.
    sender: broadcast::Sender<Arc<ServerEvent>>,
}

impl Group {
    fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            members: BTreeSet::new(),
            sender,
        }
    }
}

#[derive(Default)]
struct Inner {
    /// Groups indexed by name.
    groups: HashMap<String, Group>,
    /// Group each session is joined to.
    session_groups: HashMap<String, String>,
}

impl Inner {
    /// Remove `session_id` from `group`, collapsing the group when empty.
    fn remove_member(&mut self, group: &str, session_id: &str) -> bool {
        let Some(entry) = self.groups.get_mut(group) else {
            return false;
        };
        let removed = entry.members.remove(session_id);
        if entry.members.is_empty() {
            self.groups.remove(group);
            debug!(group, "group collapsed");
        }
        removed
    }
}

/// Process-wide registry of broadcast groups.
///
/// Shared by all connection tasks through an `Arc`.
pub struct RoomRegistry {
    inner: RwLock<Inner>,
    capacity: usize,
}

impl RoomRegistry {
    /// Create a registry with the default channel capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a registry whose groups buffer `capacity` events.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            capacity: capacity.max(1),
        }
    }

    /// Join `session_id` to `group`, creating the group if absent.
    ///
    /// A session belongs to at most one group; joining another group first
    /// removes it from the previous one. Joining the same group twice keeps a
    /// single membership entry.
    pub async fn join(&self, group: &str, session_id: &str) -> EventReceiver {
        let mut inner = self.inner.write().await;

        if let Some(previous) = inner.session_groups.get(session_id).cloned() {
            if previous != group {
                inner.remove_member(&previous, session_id);
            }
        }

        let capacity = self.capacity;
        let entry = inner
            .groups
            .entry(group.to_string())
            .or_insert_with(|| Group::new(capacity));
        entry.members.insert(session_id.to_string());
        let receiver = entry.sender.subscribe();

        inner
            .session_groups
            .insert(session_id.to_string(), group.to_string());

        debug!(group, session_id, "joined group");
        receiver
    }

    /// Remove `session_id` from `group`.
    ///
    /// Returns true if the session was a member.
    pub async fn leave(&self, group: &str, session_id: &str) -> bool {
        let mut inner = self.inner.write().await;

        if inner.session_groups.get(session_id).map(String::as_str) == Some(group) {
            inner.session_groups.remove(session_id);
        }
        let removed = inner.remove_member(group, session_id);

        if removed {
            debug!(group, session_id, "left group");
        }
        removed
    }

    /// Deliver `event` to every member of `group`.
    ///
    /// Returns the number of receivers the event was queued for.
    pub async fn broadcast(&self, group: &str, event: ServerEvent) -> usize {
        let sender = {
            let inner = self.inner.read().await;
            match inner.groups.get(group) {
                Some(entry) => entry.sender.clone(),
                None => return 0,
            }
        };

        let kind = event.kind();
        let delivered = sender.send(Arc::new(event)).unwrap_or(0);
        debug!(group, kind, delivered, "broadcast event");
        delivered
    }

    /// Number of sessions joined to `group`.
    pub async fn member_count(&self, group: &str) -> usize {
        self.inner
            .read()
            .await
            .groups
            .get(group)
            .map_or(0, |g| g.members.len())
    }

    /// Session IDs joined to `group`, sorted.
    #[cfg(test)]
    async fn members(&self, group: &str) -> Vec<String> {
        self.inner
            .read()
            .await
            .groups
            .get(group)
            .map(|g| g.members.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of non-empty groups.
    pub async fn group_count(&self) -> usize {
        self.inner.read().await.groups.len()
    }

    /// Group the session is joined to, if any.
    #[cfg(test)]
    async fn group_of(&self, session_id: &str) -> Option<String> {
        self.inner
            .read()
            .await
            .session_groups
            .get(session_id)
            .cloned()
    }

    /// Hold the write lock until the returned guard is dropped.
    #[cfg(test)]
    pub(crate) async fn hold_write_lock(&self) -> impl Sized + '_ {
        self.inner.write().await
    }

    /// Total number of joined sessions across all groups.
    #[cfg(test)]
    async fn total_members(&self) -> usize {
        self.inner.read().await.session_groups.len()
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}
