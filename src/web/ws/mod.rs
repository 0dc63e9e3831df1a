//! WebSocket module for real-time communication.

pub mod chat;

pub use chat::{chat_ws_handler, WsQuery};
