//! Sending and deleting direct messages.
//!
//! A message is persisted before any push is attempted; the push legs are
//! best-effort and never fail the request.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::auth::middleware::Claims;
use crate::db::{self, messages, models::MessageStatus, models::MessageView, users};
use crate::error::AppError;
use crate::media;
use crate::state::AppState;
use crate::ws::broadcast::send_to_user;
use crate::ws::events::{DeleteScope, ServerEvent};

/// Longest accepted message text, in characters.
pub const MAX_TEXT_LEN: usize = 4000;

#[derive(Debug, Default, Deserialize)]
pub struct SendMessageRequest {
    #[serde(default)]
    pub text: Option<String>,
    /// Inline `data:` image
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub reply_to: Option<String>,
}

struct ValidatedSend {
    text: Option<String>,
    image: Option<String>,
    reply_to: Option<String>,
}

fn validate_send(sender_id: &str, receiver_id: &str, req: SendMessageRequest) -> Result<ValidatedSend, AppError> {
    if sender_id == receiver_id {
        return Err(AppError::validation("You cannot message yourself"));
    }
    let text = req
        .text
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty());
    let image = req.image.filter(|i| !i.trim().is_empty());
    let reply_to = req.reply_to.filter(|r| !r.is_empty());

    if text.is_none() && image.is_none() && reply_to.is_none() {
        return Err(AppError::validation("Message cannot be empty"));
    }
    if text.as_ref().is_some_and(|t| t.chars().count() > MAX_TEXT_LEN) {
        return Err(AppError::validation(format!(
            "Message text exceeds {} characters",
            MAX_TEXT_LEN
        )));
    }
    Ok(ValidatedSend { text, image, reply_to })
}

/// Persist a message from `sender_id` to `receiver_id` and push it.
///
/// The initial status is `delivered` only if the receiver holds a live
/// session at send time.
pub async fn send_message(
    state: &AppState,
    sender_id: &str,
    receiver_id: &str,
    req: SendMessageRequest,
) -> Result<MessageView, AppError> {
    let send = validate_send(sender_id, receiver_id, req)?;

    {
        let sender = sender_id.to_string();
        let receiver = receiver_id.to_string();
        let reply_to = send.reply_to.clone();
        db::run(&state.db, move |conn| {
            if !users::exists(conn, &receiver)? {
                return Err(AppError::not_found("User not found"));
            }
            if users::is_blocked_either(conn, &sender, &receiver)? {
                return Err(AppError::forbidden("You cannot message this user"));
            }
            if let Some(target) = reply_to {
                if !messages::belongs_to_pair(conn, &target, &sender, &receiver)? {
                    return Err(AppError::validation("Reply target is not part of this conversation"));
                }
            }
            Ok(())
        })
        .await?;
    }

    let image_url = match send.image.as_deref() {
        Some(data) => Some(media::upload_inline(state.media.as_ref(), data, state.max_upload_bytes).await?),
        None => None,
    };

    let status = MessageStatus::initial(state.presence.is_online(receiver_id));
    let view = {
        let sender = sender_id.to_string();
        let receiver = receiver_id.to_string();
        db::run(&state.db, move |conn| {
            let row = messages::insert_message(
                conn,
                &messages::NewMessage {
                    sender_id: &sender,
                    receiver_id: &receiver,
                    text: send.text.as_deref(),
                    image: image_url.as_deref(),
                    reply_to: send.reply_to.as_deref(),
                    status,
                },
                db::now_millis(),
            )?;
            messages::to_view(conn, row)
        })
        .await?
    };

    let event = ServerEvent::NewMessage {
        message: view.clone(),
    };
    let pushed = send_to_user(&state.presence, receiver_id, &event);
    // Keep the sender's other devices in step.
    send_to_user(&state.presence, sender_id, &event);
    tracing::debug!(
        message_id = %view.id,
        sender_id = %sender_id,
        receiver_id = %receiver_id,
        status = view.status.as_str(),
        pushed,
        "Message sent"
    );

    Ok(view)
}

/// POST /api/messages/send/{id}
pub async fn send_message_route(
    State(state): State<AppState>,
    claims: Claims,
    Path(receiver_id): Path<String>,
    Json(req): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<MessageView>), AppError> {
    let view = send_message(&state, &claims.sub, &receiver_id, req).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

#[derive(Debug, Default, Deserialize)]
pub struct DeleteMessageRequest {
    #[serde(default)]
    pub delete_for: DeleteScope,
}

#[derive(Debug, Serialize)]
pub struct DeleteMessageResponse {
    pub success: bool,
    pub message: MessageView,
}

/// Delete a message for everyone (sender only) or for the caller alone.
pub async fn delete_message(
    state: &AppState,
    user_id: &str,
    message_id: &str,
    scope: DeleteScope,
) -> Result<MessageView, AppError> {
    let user = user_id.to_string();
    let id = message_id.to_string();
    let view = db::run(&state.db, move |conn| {
        let row = messages::find(conn, &id)?.ok_or_else(|| AppError::not_found("Message not found"))?;
        let now = db::now_millis();
        let row = match scope {
            DeleteScope::Everyone => {
                if row.sender_id != user {
                    return Err(AppError::forbidden(
                        "You can only delete your own messages for everyone",
                    ));
                }
                messages::soft_delete(conn, &id, now)?
                    .ok_or_else(|| AppError::not_found("Message not found"))?
            }
            DeleteScope::Me => {
                if row.sender_id != user && row.receiver_id != user {
                    return Err(AppError::forbidden("You are not part of this conversation"));
                }
                messages::delete_for_user(conn, &id, &user, now)?;
                row
            }
        };
        messages::to_view(conn, row)
    })
    .await?;

    let event = ServerEvent::MessageDeleted {
        message_id: view.id.clone(),
        delete_for: scope,
    };
    match scope {
        DeleteScope::Everyone => {
            send_to_user(&state.presence, &view.receiver_id, &event);
            send_to_user(&state.presence, &view.sender_id, &event);
        }
        DeleteScope::Me => {
            send_to_user(&state.presence, user_id, &event);
        }
    }
    tracing::debug!(message_id = %view.id, user_id = %user_id, ?scope, "Message deleted");

    Ok(view)
}

/// DELETE /api/messages/{id}
pub async fn delete_message_route(
    State(state): State<AppState>,
    claims: Claims,
    Path(message_id): Path<String>,
    body: Bytes,
) -> Result<Json<DeleteMessageResponse>, AppError> {
    // An empty body deletes for the caller only.
    let req: DeleteMessageRequest = if body.iter().all(u8::is_ascii_whitespace) {
        DeleteMessageRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| AppError::validation(format!("Invalid request body: {}", e)))?
    };
    let message = delete_message(&state, &claims.sub, &message_id, req.delete_for).await?;
    Ok(Json(DeleteMessageResponse {
        success: true,
        message,
    }))
}
