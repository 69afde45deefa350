use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, timeout};

use crate::error::ErrorKind;
use crate::state::AppState;
use crate::ws::lifecycle::Lifecycle;
use crate::ws::protocol::{self, SessionContext};

/// Ping interval: server sends WebSocket ping every 30 seconds.
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// Pong timeout: if pong not received within 10 seconds after ping, close.
const PONG_TIMEOUT: Duration = Duration::from_secs(10);

/// Run the actor-per-connection pattern for an authenticated WebSocket.
///
/// Splits the WebSocket into reader and writer halves:
/// - Writer task: owns the sink, forwards frames from an mpsc channel
/// - Reader loop: decodes incoming frames and dispatches them
///
/// The presence registry holds a clone of the channel sender, which is how
/// the rest of the system pushes events to this client.
pub async fn run_connection(socket: WebSocket, state: AppState, user_id: String) {
    let (ws_sender, mut ws_receiver) = socket.split();
    let (tx, rx) = mpsc::unbounded_channel::<Message>();

    // Start the writer first so the roster snapshot sent on activation is flushed.
    let mut writer_handle = tokio::spawn(writer_task(ws_sender, rx));

    let mut lifecycle = Lifecycle::authenticated(user_id);
    lifecycle.activate(&state, tx.clone());
    let session = SessionContext {
        session_id: lifecycle.session_id(),
        user_id: lifecycle.user_id().to_string(),
    };

    // Track pong reception
    let (pong_tx, mut pong_rx) = mpsc::unbounded_channel::<()>();

    // Ping task: sends periodic pings and finishes when a pong is overdue.
    let ping_tx = tx.clone();
    let mut ping_handle = tokio::spawn(async move {
        let mut ping_timer = interval(PING_INTERVAL);
        // Skip the first immediate tick
        ping_timer.tick().await;

        loop {
            ping_timer.tick().await;

            if ping_tx.send(Message::Ping(vec![1, 2, 3, 4].into())).is_err() {
                // Writer task has died, connection is gone
                break;
            }

            match timeout(PONG_TIMEOUT, pong_rx.recv()).await {
                Ok(Some(())) => {}
                _ => {
                    tracing::warn!("Pong timeout, closing connection");
                    let _ = ping_tx.send(Message::Close(Some(CloseFrame {
                        code: 1001,
                        reason: "Pong timeout".into(),
                    })));
                    break;
                }
            }
        }
    });

    // Reader loop: process incoming WebSocket messages until the client
    // leaves, the writer fails, or keepalive gives up.
    loop {
        tokio::select! {
            incoming = ws_receiver.next() => match incoming {
                Some(Ok(msg)) => match msg {
                    Message::Text(text) => {
                        protocol::handle_text_message(text.as_str(), &state, &session).await;
                    }
                    Message::Binary(_) => {
                        protocol::send_error_kind(
                            &state,
                            &session,
                            ErrorKind::Validation,
                            "Binary frames are not supported".to_string(),
                        );
                    }
                    Message::Pong(_) => {
                        let _ = pong_tx.send(());
                    }
                    Message::Ping(data) => {
                        let _ = tx.send(Message::Pong(data));
                    }
                    Message::Close(frame) => {
                        tracing::info!(
                            user_id = %session.user_id,
                            reason = ?frame,
                            "Client initiated close"
                        );
                        break;
                    }
                },
                Some(Err(e)) => {
                    tracing::warn!(
                        user_id = %session.user_id,
                        error = %e,
                        "WebSocket receive error"
                    );
                    break;
                }
                None => {
                    tracing::info!(user_id = %session.user_id, "WebSocket stream ended");
                    break;
                }
            },
            _ = &mut ping_handle => {
                tracing::info!(user_id = %session.user_id, "Keepalive expired");
                break;
            }
            _ = &mut writer_handle => {
                tracing::debug!(user_id = %session.user_id, "Writer finished");
                break;
            }
        }
    }

    ping_handle.abort();
    // Unregister before the writer goes away so no push lands on a dead channel.
    lifecycle.close(&state).await;
    writer_handle.abort();
}

/// Writer task: receives messages from mpsc channel and forwards them to the WebSocket sink.
async fn writer_task(
    mut ws_sender: futures_util::stream::SplitSink<WebSocket, Message>,
    mut rx: mpsc::UnboundedReceiver<Message>,
) {
    while let Some(msg) = rx.recv().await {
        let closing = matches!(msg, Message::Close(_));
        if ws_sender.send(msg).await.is_err() || closing {
            break;
        }
    }
}
