//! Chat module for chathub.
//!
//! This module provides real-time conversation rooms:
//! - Group registry with per-group broadcast channels
//! - Connection sessions (authenticate, join, relay, leave)
//! - Wire events (chat messages, typing indicators, presence)

mod event;
mod hub;
mod presence;
mod registry;
mod session;

pub use event::{ClientEvent, ServerEvent};
pub use hub::ChatHub;
pub use presence::{presence_event, Presence};
pub use registry::{EventReceiver, RoomRegistry, DEFAULT_CHANNEL_CAPACITY};
pub use session::{ChatSession, EventError, Outcome, RejectReason, SessionState};
