//! End-to-end tests for the chat WebSocket endpoint.

mod common;

use std::time::Duration;

use common::{TestServer, TEST_SECRET};
use serde_json::json;

use chathub::{issue_token, UserId};

const QUIET: Duration = Duration::from_millis(200);

// ── Admission ──

#[tokio::test]
async fn test_missing_token_closes_4002() {
    let server = TestServer::start().await;
    let mut client = server.connect_raw(&server.conversation_ref(), None).await;

    assert_eq!(client.expect_close().await, Some(4002));
    assert_eq!(server.hub.registry().group_count().await, 0);
}

#[tokio::test]
async fn test_expired_token_closes_4000() {
    let server = TestServer::start().await;
    let issued = chrono::Utc::now().timestamp() - 7200;
    let token = issue_token(TEST_SECRET, server.alice().id, 60, issued).unwrap();

    let mut client = server
        .connect_raw(&server.conversation_ref(), Some(&token))
        .await;
    assert_eq!(client.expect_close().await, Some(4000));
}

#[tokio::test]
async fn test_garbage_token_closes_4001() {
    let server = TestServer::start().await;
    let mut client = server
        .connect_raw(&server.conversation_ref(), Some("not.a.jwt"))
        .await;
    assert_eq!(client.expect_close().await, Some(4001));
}

#[tokio::test]
async fn test_wrong_secret_closes_4001() {
    let server = TestServer::start().await;
    let now = chrono::Utc::now().timestamp();
    let token = issue_token("some-other-secret", server.alice().id, 3600, now).unwrap();

    let mut client = server
        .connect_raw(&server.conversation_ref(), Some(&token))
        .await;
    assert_eq!(client.expect_close().await, Some(4001));
}

#[tokio::test]
async fn test_unknown_user_closes_4003() {
    let server = TestServer::start().await;
    let token = server.token(UserId(999));

    let mut client = server
        .connect_raw(&server.conversation_ref(), Some(&token))
        .await;
    assert_eq!(client.expect_close().await, Some(4003));
}

#[tokio::test]
async fn test_rejected_connection_is_not_announced() {
    let server = TestServer::start().await;
    let mut alice = server.join(server.alice()).await;

    let mut rejected = server
        .connect_raw(&server.conversation_ref(), Some("bogus"))
        .await;
    assert_eq!(rejected.expect_close().await, Some(4001));

    alice.expect_silence(QUIET).await;
    assert_eq!(
        server
            .hub
            .registry()
            .member_count(&server.hub.group_name(&server.conversation_ref()))
            .await,
        1
    );
}

// ── Presence ──

#[tokio::test]
async fn test_join_announces_online_to_existing_members() {
    let server = TestServer::start().await;
    let mut alice = server.join(server.alice()).await;
    let _bob = server.join(server.bob()).await;

    let event = alice.recv_json().await;
    assert_eq!(event["type"], "online_status");
    assert_eq!(event["status"], "online");
    assert_eq!(event["online_users"][0]["id"], server.bob().id.0);
    assert_eq!(event["online_users"][0]["username"], "bob");
}

#[tokio::test]
async fn test_graceful_close_announces_offline() {
    let server = TestServer::start().await;
    let mut alice = server.join(server.alice()).await;
    let bob = server.join(server.bob()).await;
    let _ = alice.recv_kind("online_status").await;

    bob.close().await;

    let event = alice.recv_json().await;
    assert_eq!(event["type"], "online_status");
    assert_eq!(event["status"], "offline");
    assert_eq!(event["online_users"][0]["id"], server.bob().id.0);

    server.wait_for_members(1).await;
    alice.expect_silence(QUIET).await;
}

#[tokio::test]
async fn test_abrupt_disconnect_announces_offline_once() {
    let server = TestServer::start().await;
    let mut alice = server.join(server.alice()).await;
    let bob = server.join(server.bob()).await;
    let _ = alice.recv_kind("online_status").await;

    bob.abort();

    let event = alice.recv_json().await;
    assert_eq!(event["status"], "offline");
    server.wait_for_members(1).await;
    alice.expect_silence(QUIET).await;
}

#[tokio::test]
async fn test_last_member_leaving_collapses_group() {
    let server = TestServer::start().await;
    let alice = server.join(server.alice()).await;

    alice.close().await;
    server.wait_for_members(0).await;
    assert_eq!(server.hub.registry().group_count().await, 0);
}

// ── Chat messages ──

#[tokio::test]
async fn test_chat_message_reaches_everyone_including_sender() {
    let server = TestServer::start().await;
    let mut alice = server.join(server.alice()).await;
    let mut bob = server.join(server.bob()).await;
    let _ = alice.recv_kind("online_status").await;

    alice
        .send_json(json!({"type": "chat_message", "message": "hello", "user": server.alice().id.0}))
        .await;

    for client in [&mut alice, &mut bob] {
        let event = client.recv_json().await;
        assert_eq!(event["type"], "chat_message");
        assert_eq!(event["message"], "hello");
        assert_eq!(event["user"]["id"], server.alice().id.0);
        assert_eq!(event["user"]["username"], "alice");
        assert!(event["timestamp"].as_str().unwrap().contains('T'));
    }

    assert_eq!(server.stored_messages().await, 1);
}

#[tokio::test]
async fn test_chat_message_scoped_to_conversation() {
    let server = TestServer::start().await;
    let mut alice = server.join(server.alice()).await;

    let token = server.token(server.bob().id);
    let mut bob = server.connect_raw("9999", Some(&token)).await;
    let _ = bob.recv_kind("online_status").await;

    alice
        .send_json(json!({"type": "chat_message", "message": "only here"}))
        .await;
    let _ = alice.recv_kind("chat_message").await;

    bob.expect_silence(QUIET).await;
}

#[tokio::test]
async fn test_interleaved_senders_see_same_order() {
    let server = TestServer::start().await;
    let mut alice = server.join(server.alice()).await;
    let mut bob = server.join(server.bob()).await;
    let _ = alice.recv_kind("online_status").await;

    for i in 0..10 {
        alice
            .send_json(json!({"type": "chat_message", "message": format!("a{i}")}))
            .await;
        bob.send_json(json!({"type": "chat_message", "message": format!("b{i}")}))
            .await;
    }

    let mut seen = Vec::new();
    for client in [&mut alice, &mut bob] {
        let mut order = Vec::new();
        for _ in 0..20 {
            let event = client.recv_kind("chat_message").await;
            order.push(event["message"].as_str().unwrap().to_string());
        }
        seen.push(order);
    }

    // Both members see one identical sequence.
    assert_eq!(seen[0], seen[1]);

    // Each sender's own messages keep their send order within it.
    for prefix in ["a", "b"] {
        let own: Vec<_> = seen[0].iter().filter(|m| m.starts_with(prefix)).cloned().collect();
        let expected: Vec<_> = (0..10).map(|i| format!("{prefix}{i}")).collect();
        assert_eq!(own, expected);
    }
    assert_eq!(server.stored_messages().await, 20);
}

#[tokio::test]
async fn test_spoofed_sender_is_dropped() {
    let server = TestServer::start().await;
    let mut alice = server.join(server.alice()).await;

    alice
        .send_json(json!({"type": "chat_message", "message": "fake", "user": server.bob().id.0}))
        .await;

    alice.expect_silence(QUIET).await;
    assert_eq!(server.stored_messages().await, 0);
}

#[tokio::test]
async fn test_storage_failure_keeps_connection_open() {
    let server = TestServer::start().await;
    let mut alice = server.join(server.alice()).await;
    let mut bob = server.join(server.bob()).await;
    let _ = alice.recv_kind("online_status").await;

    server.store.set_fail_writes(true);
    alice
        .send_json(json!({"type": "chat_message", "message": "lost"}))
        .await;
    alice.expect_silence(QUIET).await;
    bob.expect_silence(QUIET).await;

    server.store.set_fail_writes(false);
    alice
        .send_json(json!({"type": "chat_message", "message": "kept"}))
        .await;
    assert_eq!(bob.recv_json().await["message"], "kept");
    assert_eq!(alice.recv_json().await["message"], "kept");
    assert_eq!(server.stored_messages().await, 1);
}

// ── Typing ──

#[tokio::test]
async fn test_typing_to_self_is_suppressed() {
    let server = TestServer::start().await;
    let mut alice = server.join(server.alice()).await;
    let mut bob = server.join(server.bob()).await;
    let _ = alice.recv_kind("online_status").await;

    alice
        .send_json(json!({"type": "typing", "receiver": server.alice().id.0}))
        .await;

    alice.expect_silence(QUIET).await;
    bob.expect_silence(QUIET).await;
}

#[tokio::test]
async fn test_typing_to_other_is_broadcast() {
    let server = TestServer::start().await;
    let mut alice = server.join(server.alice()).await;
    let mut bob = server.join(server.bob()).await;
    let mut carol = server.join(server.carol()).await;
    let _ = alice.recv_kind("online_status").await;
    let _ = alice.recv_kind("online_status").await;
    let _ = bob.recv_kind("online_status").await;

    alice
        .send_json(json!({"type": "typing", "receiver": server.bob().id.0}))
        .await;

    for client in [&mut alice, &mut bob, &mut carol] {
        let event = client.recv_json().await;
        assert_eq!(event["type"], "typing");
        assert_eq!(event["user"]["id"], server.alice().id.0);
        assert_eq!(event["receiver"], server.bob().id.0);
        assert_eq!(event["is_typing"], true);
    }
}

#[tokio::test]
async fn test_typing_without_receiver_is_broadcast() {
    let server = TestServer::start().await;
    let mut alice = server.join(server.alice()).await;
    let mut bob = server.join(server.bob()).await;
    let _ = alice.recv_kind("online_status").await;

    alice
        .send_json(json!({"type": "typing", "receiver": null}))
        .await;

    let event = bob.recv_json().await;
    assert_eq!(event["type"], "typing");
    assert!(event["receiver"].is_null());
}

// ── Robustness ──

#[tokio::test]
async fn test_unknown_and_malformed_frames_are_ignored() {
    let server = TestServer::start().await;
    let mut alice = server.join(server.alice()).await;

    alice.send_json(json!({"type": "mark_read", "id": 4})).await;
    alice.send_text("this is not json").await;
    alice.send_json(json!({"type": "chat_message"})).await;
    alice.expect_silence(QUIET).await;

    alice
        .send_json(json!({"type": "chat_message", "message": "still here"}))
        .await;
    assert_eq!(alice.recv_json().await["message"], "still here");
}

// ── Idle timeout ──

#[tokio::test]
async fn test_idle_connection_closed_and_announced_offline() {
    let server = TestServer::start_with_idle_timeout(Some(Duration::from_millis(300))).await;
    let mut alice = server.join(server.alice()).await;
    let mut bob = server.join(server.bob()).await;
    let _ = alice.recv_kind("online_status").await;

    // An ignored frame restarts only bob's timer, so alice goes idle first.
    tokio::time::sleep(Duration::from_millis(150)).await;
    bob.send_json(json!({"type": "noop"})).await;

    assert_eq!(alice.expect_close().await, Some(1001));

    let event = bob.recv_json().await;
    assert_eq!(event["type"], "online_status");
    assert_eq!(event["status"], "offline");
    assert_eq!(event["online_users"][0]["id"], server.alice().id.0);

    // Nothing else arrives before bob times out too.
    assert_eq!(bob.expect_close().await, Some(1001));
    server.wait_for_members(0).await;
}

#[tokio::test]
async fn test_group_traffic_keeps_silent_member_connected() {
    let server = TestServer::start_with_idle_timeout(Some(Duration::from_millis(400))).await;
    let mut alice = server.join(server.alice()).await;
    let mut bob = server.join(server.bob()).await;
    let _ = alice.recv_kind("online_status").await;

    for _ in 0..8 {
        tokio::time::sleep(Duration::from_millis(150)).await;
        alice
            .send_json(json!({"type": "typing", "receiver": server.bob().id.0}))
            .await;
        assert_eq!(alice.recv_json().await["type"], "typing");
        assert_eq!(bob.recv_json().await["type"], "typing");
    }

    assert_eq!(
        server
            .hub
            .registry()
            .member_count(&server.hub.group_name(&server.conversation_ref()))
            .await,
        2
    );
}
