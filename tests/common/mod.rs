//! Test helpers for WebSocket integration tests.
//!
//! Provides TestServer, WsClient, and a store wrapper that can be told to
//! fail writes.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use chathub::config::ServerConfig;
use chathub::{
    issue_token, ChatHub, ChatMessage, Conversation, ConversationRepository, ConversationStore,
    Database, MessageRepository, NewConversation, NewUser, SqliteStore, StoreError,
    TokenValidator, User, UserId, UserRepository, WebServer,
};

/// Default timeout for test operations.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Secret shared by the test server and the token helpers.
pub const TEST_SECRET: &str = "integration-test-secret";

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Conversation store whose writes can be switched off.
pub struct FlakyStore {
    inner: SqliteStore,
    fail_writes: AtomicBool,
}

impl FlakyStore {
    pub fn new(inner: SqliteStore) -> Self {
        Self {
            inner,
            fail_writes: AtomicBool::new(false),
        }
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl ConversationStore for FlakyStore {
    async fn fetch_by_id(&self, conversation_ref: &str) -> Result<Conversation, StoreError> {
        ConversationStore::fetch_by_id(&self.inner, conversation_ref).await
    }

    async fn append_message(
        &self,
        conversation: &Conversation,
        sender: &User,
        content: &str,
    ) -> Result<ChatMessage, StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("write refused".to_string()));
        }
        self.inner.append_message(conversation, sender, content).await
    }
}

/// A running chat server backed by an in-memory database.
pub struct TestServer {
    pub addr: SocketAddr,
    pub db: Database,
    pub store: Arc<FlakyStore>,
    pub hub: Arc<ChatHub>,
    /// Seeded users: alice, bob, carol.
    pub users: Vec<User>,
    /// Seeded conversation.
    pub conversation: Conversation,
}

impl TestServer {
    /// Start a server on a random port.
    pub async fn start() -> Self {
        Self::start_with_idle_timeout(None).await
    }

    /// Start a server whose connections close after `idle_timeout` without traffic.
    pub async fn start_with_idle_timeout(idle_timeout: Option<Duration>) -> Self {
        let db = Database::open_in_memory().await.unwrap();

        let repo = UserRepository::new(db.pool());
        let mut users = Vec::new();
        for (username, display_name) in [("alice", "Alice"), ("bob", "Bob"), ("carol", "Carol")] {
            users.push(
                repo.create(&NewUser::new(username, display_name))
                    .await
                    .unwrap(),
            );
        }
        let conversation = ConversationRepository::new(db.pool())
            .create(&NewConversation::new("general"))
            .await
            .unwrap();

        let sqlite = SqliteStore::new(db.clone());
        let store = Arc::new(FlakyStore::new(sqlite.clone()));
        let hub = Arc::new(ChatHub::new(
            TokenValidator::new(TEST_SECRET),
            Arc::new(sqlite),
            store.clone(),
        )
        .with_idle_timeout(idle_timeout));

        let config = ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            cors_origins: vec![],
        };
        let addr = WebServer::new(&config, hub.clone())
            .unwrap()
            .run_with_addr()
            .await
            .unwrap();

        Self {
            addr,
            db,
            store,
            hub,
            users,
            conversation,
        }
    }

    pub fn alice(&self) -> &User {
        &self.users[0]
    }

    pub fn bob(&self) -> &User {
        &self.users[1]
    }

    pub fn carol(&self) -> &User {
        &self.users[2]
    }

    /// Conversation reference used in URLs.
    pub fn conversation_ref(&self) -> String {
        self.conversation.id.to_string()
    }

    /// Mint a token for `user_id` valid for an hour.
    pub fn token(&self, user_id: UserId) -> String {
        issue_token(TEST_SECRET, user_id, 3600, chrono::Utc::now().timestamp()).unwrap()
    }

    /// URL of the chat endpoint.
    pub fn url(&self, conversation_ref: &str, token: Option<&str>) -> String {
        match token {
            Some(token) => format!("ws://{}/ws/chat/{conversation_ref}?token={token}", self.addr),
            None => format!("ws://{}/ws/chat/{conversation_ref}", self.addr),
        }
    }

    /// Connect with an arbitrary token.
    pub async fn connect_raw(&self, conversation_ref: &str, token: Option<&str>) -> WsClient {
        WsClient::connect(&self.url(conversation_ref, token)).await
    }

    /// Connect `user` to the seeded conversation and consume their own online event.
    pub async fn join(&self, user: &User) -> WsClient {
        let token = self.token(user.id);
        let mut client = self
            .connect_raw(&self.conversation_ref(), Some(&token))
            .await;
        let event = client.recv_json().await;
        assert_eq!(event["type"], "online_status");
        assert_eq!(event["online_users"][0]["id"], user.id.0);
        client
    }

    /// Number of messages stored for the seeded conversation.
    pub async fn stored_messages(&self) -> i64 {
        MessageRepository::new(self.db.pool())
            .count(self.conversation.id)
            .await
            .unwrap()
    }

    /// Wait until the seeded group has `count` members.
    pub async fn wait_for_members(&self, count: usize) {
        let group = self.hub.group_name(&self.conversation_ref());
        timeout(DEFAULT_TIMEOUT, async {
            while self.hub.registry().member_count(&group).await != count {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("timed out waiting for group membership");
    }
}

/// WebSocket test client.
pub struct WsClient {
    stream: WsStream,
}

impl WsClient {
    /// Connect to `url`.
    pub async fn connect(url: &str) -> Self {
        let (stream, _) = connect_async(url).await.unwrap();
        Self { stream }
    }

    /// Send a JSON text frame.
    pub async fn send_json(&mut self, value: Value) {
        self.send_text(&value.to_string()).await;
    }

    /// Send a raw text frame.
    pub async fn send_text(&mut self, text: &str) {
        self.stream
            .send(Message::Text(text.to_string().into()))
            .await
            .unwrap();
    }

    /// Receive the next text frame as JSON.
    pub async fn recv_json(&mut self) -> Value {
        timeout(DEFAULT_TIMEOUT, async {
            loop {
                match self.stream.next().await {
                    Some(Ok(Message::Text(text))) => {
                        return serde_json::from_str::<Value>(text.as_str()).unwrap();
                    }
                    Some(Ok(Message::Close(frame))) => panic!("unexpected close: {frame:?}"),
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => panic!("websocket error: {e}"),
                    None => panic!("stream ended"),
                }
            }
        })
        .await
        .expect("timed out waiting for a text frame")
    }

    /// Receive text frames until one of type `kind` arrives.
    pub async fn recv_kind(&mut self, kind: &str) -> Value {
        loop {
            let value = self.recv_json().await;
            if value["type"] == kind {
                return value;
            }
        }
    }

    /// Assert nothing arrives within `duration`.
    pub async fn expect_silence(&mut self, duration: Duration) {
        if let Ok(Some(Ok(Message::Text(text)))) = timeout(duration, self.stream.next()).await {
            panic!("expected no frame, got {text}");
        }
    }

    /// Wait for the server's close frame and return its code.
    pub async fn expect_close(&mut self) -> Option<u16> {
        timeout(DEFAULT_TIMEOUT, async {
            loop {
                match self.stream.next().await {
                    Some(Ok(Message::Close(frame))) => {
                        return frame.map(|f| u16::from(f.code));
                    }
                    Some(Ok(Message::Text(text))) => panic!("expected close, got {text}"),
                    Some(Ok(_)) => continue,
                    Some(Err(_)) | None => return None,
                }
            }
        })
        .await
        .expect("timed out waiting for close")
    }

    /// Close gracefully.
    pub async fn close(mut self) {
        let _ = self.stream.close(None).await;
    }

    /// Drop the TCP connection without a close handshake.
    pub fn abort(self) {
        drop(self.stream);
    }
}
