//! Shared harness for the HTTP and WebSocket integration tests.
#![allow(dead_code)]

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::StreamExt;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use zapp_server::media::LocalObjectStore;
use zapp_server::presence::{PresenceRegistry, TypingTracker};
use zapp_server::state::{AppState, RateLimit};
use zapp_server::{auth, db, routes};

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
pub type WsWrite = SplitSink<WsStream, Message>;
pub type WsRead = SplitStream<WsStream>;

/// Quiet period for typing indicators in tests.
pub const TYPING_QUIET: Duration = Duration::from_millis(200);

pub struct TestServer {
    pub base_url: String,
    pub addr: SocketAddr,
    pub state: AppState,
    pub client: reqwest::Client,
    _tmp_dir: TempDir,
}

pub struct TestUser {
    pub id: String,
    pub token: String,
}

/// Start a server on a random port backed by a fresh data directory.
pub async fn start_test_server() -> TestServer {
    let tmp_dir = TempDir::new().expect("Failed to create temp dir");
    let data_dir = tmp_dir.path().to_str().expect("temp dir path").to_string();

    let db = db::init_db(&data_dir).expect("Failed to init DB");
    let jwt_secret = auth::jwt::load_or_generate_jwt_secret(&data_dir).expect("Failed to create JWT secret");

    let presence = Arc::new(PresenceRegistry::new());
    let typing = Arc::new(TypingTracker::new(presence.clone(), TYPING_QUIET));
    let state = AppState {
        db,
        jwt_secret,
        token_ttl_secs: 3600,
        presence,
        typing,
        media: Arc::new(LocalObjectStore::new(&data_dir)),
        max_upload_bytes: 1024 * 1024,
        // Many signups per test all come from 127.0.0.1.
        auth_rate_limit: RateLimit {
            per_second: 1,
            burst: 1000,
        },
    };

    let app = routes::build_router(state.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("Failed to bind");
    let addr = listener.local_addr().expect("local addr");

    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .expect("Server error");
    });

    TestServer {
        base_url: format!("http://{}", addr),
        addr,
        state,
        client: reqwest::Client::new(),
        _tmp_dir: tmp_dir,
    }
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Sign up `name` with a derived email and return its id and token.
    pub async fn signup(&self, name: &str) -> TestUser {
        let resp = self
            .client
            .post(self.url("/api/auth/signup"))
            .json(&json!({
                "full_name": name,
                "email": format!("{}@example.com", name.to_lowercase()),
                "password": "hunter22",
            }))
            .send()
            .await
            .expect("signup request");
        assert_eq!(resp.status(), 201, "signup of {} failed", name);
        let body: Value = resp.json().await.expect("signup body");
        TestUser {
            id: body["user"]["id"].as_str().expect("user id").to_string(),
            token: body["token"].as_str().expect("token").to_string(),
        }
    }

    pub async fn get(&self, user: &TestUser, path: &str) -> reqwest::Response {
        self.client
            .get(self.url(path))
            .bearer_auth(&user.token)
            .send()
            .await
            .expect("GET request")
    }

    pub async fn post(&self, user: &TestUser, path: &str, body: Value) -> reqwest::Response {
        self.client
            .post(self.url(path))
            .bearer_auth(&user.token)
            .json(&body)
            .send()
            .await
            .expect("POST request")
    }

    pub async fn put(&self, user: &TestUser, path: &str, body: Value) -> reqwest::Response {
        self.client
            .put(self.url(path))
            .bearer_auth(&user.token)
            .json(&body)
            .send()
            .await
            .expect("PUT request")
    }

    pub async fn delete(&self, user: &TestUser, path: &str, body: Value) -> reqwest::Response {
        self.client
            .delete(self.url(path))
            .bearer_auth(&user.token)
            .json(&body)
            .send()
            .await
            .expect("DELETE request")
    }

    /// Send a text message and return the created message JSON.
    pub async fn send_text(&self, from: &TestUser, to: &TestUser, text: &str) -> Value {
        let resp = self
            .post(from, &format!("/api/messages/send/{}", to.id), json!({ "text": text }))
            .await;
        assert_eq!(resp.status(), 201, "send failed");
        resp.json().await.expect("message body")
    }

    /// Open a WebSocket session for `user`.
    pub async fn connect(&self, user: &TestUser) -> (WsWrite, WsRead) {
        let ws_url = format!("ws://{}/ws?token={}", self.addr, user.token);
        let (ws_stream, _) = tokio_tungstenite::connect_async(&ws_url)
            .await
            .expect("Failed to connect to WebSocket");
        ws_stream.split()
    }
}

/// Next JSON event on the stream, skipping control frames.
pub async fn next_event(read: &mut WsRead, wait: Duration) -> Option<Value> {
    let deadline = tokio::time::Instant::now() + wait;
    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        match tokio::time::timeout(remaining, read.next()).await {
            Ok(Some(Ok(Message::Text(text)))) => {
                return Some(serde_json::from_str(text.as_str()).expect("event is JSON"));
            }
            Ok(Some(Ok(Message::Ping(_) | Message::Pong(_)))) => continue,
            _ => return None,
        }
    }
}

/// Read events until one named `name` arrives; panics after two seconds.
pub async fn expect_event(read: &mut WsRead, name: &str) -> Value {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        match next_event(read, remaining).await {
            Some(event) if event["event"] == name => return event,
            Some(_) => continue,
            None => panic!("timed out waiting for {}", name),
        }
    }
}

/// Assert that no event named `name` arrives within `wait`.
pub async fn expect_no_event(read: &mut WsRead, name: &str, wait: Duration) {
    let deadline = tokio::time::Instant::now() + wait;
    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        match next_event(read, remaining).await {
            Some(event) => assert_ne!(event["event"], name, "unexpected event: {}", event),
            None => return,
        }
    }
}

/// Discard everything queued until the stream has been quiet for 200ms.
pub async fn drain(read: &mut WsRead) {
    while next_event(read, Duration::from_millis(200)).await.is_some() {}
}

pub fn client_event(event: &str, data: Value) -> Message {
    Message::Text(json!({ "event": event, "data": data }).to_string().into())
}
