mod common;

use common::{client_event, drain, expect_event, expect_no_event, start_test_server, TYPING_QUIET};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::time::Duration;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::Message;

fn ids(event: &Value, field: &str) -> Vec<String> {
    event["data"][field]
        .as_array()
        .expect("id array")
        .iter()
        .map(|v| v.as_str().expect("id string").to_string())
        .collect()
}

async fn expect_close_code(ws_url: &str, code: u16) {
    let (ws_stream, _) = tokio_tungstenite::connect_async(ws_url)
        .await
        .expect("WebSocket should upgrade before refusing");
    let (_write, mut read) = ws_stream.split();

    let msg = tokio::time::timeout(Duration::from_secs(2), read.next())
        .await
        .expect("Expected close message within timeout");
    match msg {
        Some(Ok(Message::Close(Some(frame)))) => {
            assert_eq!(frame.code, CloseCode::from(code));
        }
        other => panic!("Expected close frame with code {}, got: {:?}", code, other),
    }
}

#[tokio::test]
async fn test_ws_connect_receives_roster() {
    let server = start_test_server().await;
    let alice = server.signup("Alice").await;

    let (_write, mut read) = server.connect(&alice).await;
    let roster = expect_event(&mut read, "online_users").await;
    assert_eq!(ids(&roster, "user_ids"), vec![alice.id.clone()]);

    // Nothing else arrives for a lone session.
    expect_no_event(&mut read, "user_online", Duration::from_millis(300)).await;
}

#[tokio::test]
async fn test_ws_missing_token_is_refused() {
    let server = start_test_server().await;
    expect_close_code(&format!("ws://{}/ws", server.addr), 4002).await;
}

#[tokio::test]
async fn test_ws_invalid_token_is_refused() {
    let server = start_test_server().await;
    expect_close_code(&format!("ws://{}/ws?token=invalid_jwt_token", server.addr), 4002).await;
}

#[tokio::test]
async fn test_ws_expired_token_is_refused() {
    let server = start_test_server().await;
    let alice = server.signup("Alice").await;
    let expired = zapp_server::auth::jwt::issue_access_token(&server.state.jwt_secret, &alice.id, -60)
        .expect("token");
    expect_close_code(&format!("ws://{}/ws?token={}", server.addr, expired), 4001).await;
    assert!(!server.state.presence.is_online(&alice.id));
}

#[tokio::test]
async fn test_ws_ping_pong() {
    let server = start_test_server().await;
    let alice = server.signup("Alice").await;
    let (mut write, mut read) = server.connect(&alice).await;
    drain(&mut read).await;

    write
        .send(Message::Ping(vec![42, 43, 44].into()))
        .await
        .expect("Failed to send ping");

    let msg = tokio::time::timeout(Duration::from_secs(2), read.next())
        .await
        .expect("Expected pong within timeout");
    match msg {
        Some(Ok(Message::Pong(data))) => assert_eq!(data.as_ref(), &[42, 43, 44]),
        other => panic!("Expected Pong message, got: {:?}", other),
    }
}

#[tokio::test]
async fn test_presence_online_offline_with_multiple_devices() {
    let server = start_test_server().await;
    let alice = server.signup("Alice").await;
    let bob = server.signup("Bob").await;

    let (_alice_write, mut alice_read) = server.connect(&alice).await;
    drain(&mut alice_read).await;

    // First device: announced.
    let (mut bob_phone, mut bob_phone_read) = server.connect(&bob).await;
    let online = expect_event(&mut alice_read, "user_online").await;
    assert_eq!(online["data"]["user_id"], bob.id.as_str());
    let roster = expect_event(&mut bob_phone_read, "online_users").await;
    let mut roster_ids = ids(&roster, "user_ids");
    roster_ids.sort();
    let mut expected = vec![alice.id.clone(), bob.id.clone()];
    expected.sort();
    assert_eq!(roster_ids, expected);
    // A user is never told about themselves coming online.
    expect_no_event(&mut bob_phone_read, "user_online", Duration::from_millis(300)).await;

    // Second device: no second announcement.
    let (mut bob_laptop, mut bob_laptop_read) = server.connect(&bob).await;
    expect_event(&mut bob_laptop_read, "online_users").await;
    expect_no_event(&mut alice_read, "user_online", Duration::from_millis(300)).await;
    assert_eq!(server.state.presence.sessions_for(&bob.id).len(), 2);

    // Dropping one device keeps the user online.
    bob_phone.send(Message::Close(None)).await.expect("close");
    expect_no_event(&mut alice_read, "user_offline", Duration::from_millis(400)).await;
    assert!(server.state.presence.is_online(&bob.id));

    bob_laptop.send(Message::Close(None)).await.expect("close");
    let offline = expect_event(&mut alice_read, "user_offline").await;
    assert_eq!(offline["data"]["user_id"], bob.id.as_str());
    assert!(!server.state.presence.is_online(&bob.id));
}

#[tokio::test]
async fn test_disconnect_stamps_last_seen() {
    let server = start_test_server().await;
    let alice = server.signup("Alice").await;

    let before: Value = server.get(&alice, "/api/auth/check").await.json().await.expect("check");

    tokio::time::sleep(Duration::from_millis(20)).await;
    let (mut write, mut read) = server.connect(&alice).await;
    drain(&mut read).await;
    write.send(Message::Close(None)).await.expect("close");
    tokio::time::sleep(Duration::from_millis(300)).await;

    let after: Value = server.get(&alice, "/api/auth/check").await.json().await.expect("check");
    assert_ne!(before["last_seen"], after["last_seen"]);
}

#[tokio::test]
async fn test_new_message_reaches_receiver_and_sender_devices() {
    let server = start_test_server().await;
    let alice = server.signup("Alice").await;
    let bob = server.signup("Bob").await;

    let (_bw, mut bob_read) = server.connect(&bob).await;
    let (_aw, mut alice_read) = server.connect(&alice).await;
    drain(&mut bob_read).await;
    drain(&mut alice_read).await;

    let sent = server.send_text(&alice, &bob, "hello bob").await;
    assert_eq!(sent["status"], "delivered", "receiver was online");

    let pushed = expect_event(&mut bob_read, "new_message").await;
    assert_eq!(pushed["data"]["message"]["id"], sent["id"]);
    assert_eq!(pushed["data"]["message"]["text"], "hello bob");

    let echoed = expect_event(&mut alice_read, "new_message").await;
    assert_eq!(echoed["data"]["message"]["id"], sent["id"]);
}

#[tokio::test]
async fn test_offline_delivery_then_read_receipts() {
    let server = start_test_server().await;
    let alice = server.signup("Alice").await;
    let bob = server.signup("Bob").await;

    let (_aw, mut alice_read) = server.connect(&alice).await;
    drain(&mut alice_read).await;

    // Bob is offline: the message stays `sent`.
    let first = server.send_text(&alice, &bob, "are you there?").await;
    let second = server.send_text(&alice, &bob, "ping").await;
    assert_eq!(first["status"], "sent");
    assert_eq!(second["status"], "sent");

    let (mut bob_write, mut bob_read) = server.connect(&bob).await;
    drain(&mut bob_read).await;
    drain(&mut alice_read).await;

    let pending: Vec<Value> = server.get(&bob, "/api/messages/pending").await.json().await.expect("pending");
    let pending_ids: Vec<&str> = pending.iter().map(|m| m["id"].as_str().expect("id")).collect();
    assert_eq!(pending_ids, vec![first["id"].as_str().expect("id"), second["id"].as_str().expect("id")]);

    bob_write
        .send(client_event(
            "message_delivered",
            json!({ "message_ids": [first["id"], second["id"]] }),
        ))
        .await
        .expect("ack");
    let delivered = expect_event(&mut alice_read, "messages_delivered").await;
    let mut delivered_ids = ids(&delivered, "message_ids");
    delivered_ids.sort();
    let mut expected = vec![first["id"].as_str().expect("id").to_string(), second["id"].as_str().expect("id").to_string()];
    expected.sort();
    assert_eq!(delivered_ids, expected);

    // A repeated acknowledgement changes nothing and stays silent.
    let resp = server
        .post(&bob, "/api/messages/delivered", json!({ "message_ids": [first["id"]] }))
        .await;
    let body: Value = resp.json().await.expect("delivered body");
    assert_eq!(body["message_ids"], json!([]));
    expect_no_event(&mut alice_read, "messages_delivered", Duration::from_millis(300)).await;

    let resp = server.put(&bob, &format!("/api/messages/read/{}", alice.id), json!({})).await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.expect("read body");
    assert_eq!(body["updated"], 2);
    let read = expect_event(&mut alice_read, "messages_read").await;
    assert_eq!(read["data"]["read_by"], bob.id.as_str());

    // Marking again is a no-op with no duplicate receipt.
    let body: Value = server
        .put(&bob, &format!("/api/messages/read/{}", alice.id), json!({}))
        .await
        .json()
        .await
        .expect("read body");
    assert_eq!(body["updated"], 0);
    expect_no_event(&mut alice_read, "messages_read", Duration::from_millis(300)).await;

    let history: Value = server
        .get(&alice, &format!("/api/messages/{}", bob.id))
        .await
        .json()
        .await
        .expect("history");
    for message in history["messages"].as_array().expect("messages") {
        assert_eq!(message["status"], "read");
    }
}

#[tokio::test]
async fn test_mark_read_over_socket() {
    let server = start_test_server().await;
    let alice = server.signup("Alice").await;
    let bob = server.signup("Bob").await;

    let (_aw, mut alice_read) = server.connect(&alice).await;
    let (mut bob_write, mut bob_read) = server.connect(&bob).await;
    server.send_text(&alice, &bob, "read me").await;
    drain(&mut alice_read).await;
    drain(&mut bob_read).await;

    bob_write
        .send(client_event("mark_read", json!({ "sender_id": alice.id })))
        .await
        .expect("mark_read");
    let read = expect_event(&mut alice_read, "messages_read").await;
    assert_eq!(read["data"]["read_by"], bob.id.as_str());
}

#[tokio::test]
async fn test_typing_relay_and_expiry() {
    let server = start_test_server().await;
    let alice = server.signup("Alice").await;
    let bob = server.signup("Bob").await;

    let (mut alice_write, mut alice_read) = server.connect(&alice).await;
    let (_bw, mut bob_read) = server.connect(&bob).await;
    drain(&mut alice_read).await;
    drain(&mut bob_read).await;

    alice_write
        .send(client_event("typing", json!({ "receiver_id": bob.id })))
        .await
        .expect("typing");
    let typing = expect_event(&mut bob_read, "user_typing").await;
    assert_eq!(typing["data"]["sender_id"], alice.id.as_str());

    // No explicit stop: the server closes the indicator after the quiet period.
    let started = tokio::time::Instant::now();
    let stopped = expect_event(&mut bob_read, "user_stop_typing").await;
    assert_eq!(stopped["data"]["sender_id"], alice.id.as_str());
    assert!(started.elapsed() + Duration::from_millis(50) >= TYPING_QUIET);

    alice_write
        .send(client_event("stop_typing", json!({ "receiver_id": bob.id })))
        .await
        .expect("stop_typing");
    expect_event(&mut bob_read, "user_stop_typing").await;
}

#[tokio::test]
async fn test_malformed_event_gets_error_reply() {
    let server = start_test_server().await;
    let alice = server.signup("Alice").await;
    let (mut write, mut read) = server.connect(&alice).await;
    drain(&mut read).await;

    write
        .send(Message::Text(r#"{"event":"nonsense","data":{}}"#.into()))
        .await
        .expect("send");
    let error = expect_event(&mut read, "error").await;
    assert_eq!(error["data"]["kind"], "validation");

    write
        .send(client_event("mark_read", json!({ "sender_id": alice.id })))
        .await
        .expect("send");
    let error = expect_event(&mut read, "error").await;
    assert_eq!(error["data"]["kind"], "validation");

    // The session survives bad input.
    assert!(server.state.presence.is_online(&alice.id));
}

#[tokio::test]
async fn test_story_events_respect_blocks() {
    let server = start_test_server().await;
    let alice = server.signup("Alice").await;
    let bob = server.signup("Bob").await;
    let carol = server.signup("Carol").await;

    let resp = server.post(&bob, &format!("/api/users/block/{}", alice.id), json!({})).await;
    assert_eq!(resp.status(), 200);

    let (_bw, mut bob_read) = server.connect(&bob).await;
    let (_cw, mut carol_read) = server.connect(&carol).await;
    drain(&mut bob_read).await;
    drain(&mut carol_read).await;

    let resp = server
        .post(&alice, "/api/stories", json!({ "kind": "text", "content": "morning" }))
        .await;
    assert_eq!(resp.status(), 201);
    let story: Value = resp.json().await.expect("story");

    let pushed = expect_event(&mut carol_read, "new_story").await;
    assert_eq!(pushed["data"]["story"]["id"], story["id"]);
    expect_no_event(&mut bob_read, "new_story", Duration::from_millis(300)).await;

    let resp = server
        .delete(&alice, &format!("/api/stories/{}", story["id"].as_str().expect("id")), json!({}))
        .await;
    assert_eq!(resp.status(), 200);
    let deleted = expect_event(&mut carol_read, "story_deleted").await;
    assert_eq!(deleted["data"]["story_id"], story["id"]);
    assert_eq!(deleted["data"]["user_id"], alice.id.as_str());
}

#[tokio::test]
async fn test_message_deleted_fan_out_by_scope() {
    let server = start_test_server().await;
    let alice = server.signup("Alice").await;
    let bob = server.signup("Bob").await;
    let carol = server.signup("Carol").await;

    let (_a1w, mut alice_phone) = server.connect(&alice).await;
    let (_a2w, mut alice_laptop) = server.connect(&alice).await;
    let (_bw, mut bob_read) = server.connect(&bob).await;
    let (_cw, mut carol_read) = server.connect(&carol).await;

    let everyone = server.send_text(&alice, &bob, "unsend me").await;
    let mine = server.send_text(&bob, &alice, "hide me").await;
    for read in [&mut alice_phone, &mut alice_laptop, &mut bob_read, &mut carol_read] {
        drain(read).await;
    }

    // Everyone: both parties and all of the sender's devices, nobody else.
    let resp = server
        .delete(
            &alice,
            &format!("/api/messages/{}", everyone["id"].as_str().expect("id")),
            json!({ "delete_for": "everyone" }),
        )
        .await;
    assert_eq!(resp.status(), 200);
    for read in [&mut bob_read, &mut alice_phone, &mut alice_laptop] {
        let event = expect_event(read, "message_deleted").await;
        assert_eq!(event["data"]["message_id"], everyone["id"]);
        assert_eq!(event["data"]["delete_for"], "everyone");
    }
    expect_no_event(&mut carol_read, "message_deleted", Duration::from_millis(300)).await;

    // Me: only the caller's own sessions.
    let resp = server
        .delete(
            &alice,
            &format!("/api/messages/{}", mine["id"].as_str().expect("id")),
            json!({ "delete_for": "me" }),
        )
        .await;
    assert_eq!(resp.status(), 200);
    for read in [&mut alice_phone, &mut alice_laptop] {
        let event = expect_event(read, "message_deleted").await;
        assert_eq!(event["data"]["message_id"], mine["id"]);
        assert_eq!(event["data"]["delete_for"], "me");
    }
    expect_no_event(&mut bob_read, "message_deleted", Duration::from_millis(300)).await;
    expect_no_event(&mut carol_read, "message_deleted", Duration::from_millis(300)).await;
}
