//! Delivery and read transitions, shared by the REST routes and the
//! WebSocket `mark_read` / `message_delivered` events.

use std::collections::BTreeMap;

use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::auth::middleware::Claims;
use crate::db::{self, messages, models::MessageView};
use crate::error::AppError;
use crate::state::AppState;
use crate::ws::broadcast::send_to_user;
use crate::ws::events::ServerEvent;

/// Upper bound on ids accepted in one delivered batch.
pub const MAX_DELIVERED_BATCH: usize = 500;

/// Bulk read of everything `sender_id` sent to `reader_id`. The sender is
/// notified once, and only when at least one message moved.
pub async fn mark_read(state: &AppState, reader_id: &str, sender_id: &str) -> Result<usize, AppError> {
    if reader_id == sender_id {
        return Err(AppError::validation("You cannot mark your own messages as read"));
    }
    let reader = reader_id.to_string();
    let sender = sender_id.to_string();
    let changed = db::run(&state.db, move |conn| {
        messages::mark_read_from(conn, &sender, &reader, db::now_millis())
    })
    .await?;

    if changed > 0 {
        send_to_user(
            &state.presence,
            sender_id,
            &ServerEvent::MessagesRead {
                read_by: reader_id.to_string(),
            },
        );
    }
    tracing::debug!(reader_id = %reader_id, sender_id = %sender_id, changed, "Marked read");
    Ok(changed)
}

/// Move acknowledged ids addressed to `receiver_id` from `sent` to
/// `delivered`, then tell each original sender which of theirs moved.
pub async fn acknowledge_delivered(
    state: &AppState,
    receiver_id: &str,
    message_ids: Vec<String>,
) -> Result<Vec<String>, AppError> {
    if message_ids.len() > MAX_DELIVERED_BATCH {
        return Err(AppError::validation(format!(
            "At most {} message ids per batch",
            MAX_DELIVERED_BATCH
        )));
    }
    let receiver = receiver_id.to_string();
    let moved = db::run(&state.db, move |conn| {
        messages::mark_delivered(conn, &receiver, &message_ids, db::now_millis())
    })
    .await?;

    let mut by_sender: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (message_id, sender_id) in &moved {
        by_sender
            .entry(sender_id.clone())
            .or_default()
            .push(message_id.clone());
    }
    for (sender_id, message_ids) in by_sender {
        send_to_user(&state.presence, &sender_id, &ServerEvent::MessagesDelivered { message_ids });
    }

    Ok(moved.into_iter().map(|(id, _)| id).collect())
}

#[derive(Debug, Serialize)]
pub struct MarkReadResponse {
    pub success: bool,
    pub updated: usize,
}

/// PUT /api/messages/read/{id}
pub async fn mark_read_route(
    State(state): State<AppState>,
    claims: Claims,
    Path(sender_id): Path<String>,
) -> Result<Json<MarkReadResponse>, AppError> {
    let updated = mark_read(&state, &claims.sub, &sender_id).await?;
    Ok(Json(MarkReadResponse {
        success: true,
        updated,
    }))
}

#[derive(Debug, Deserialize, Serialize)]
pub struct DeliveredBatch {
    pub message_ids: Vec<String>,
}

/// POST /api/messages/delivered
///
/// Responds with the subset of ids that actually moved.
pub async fn delivered_route(
    State(state): State<AppState>,
    claims: Claims,
    Json(batch): Json<DeliveredBatch>,
) -> Result<Json<DeliveredBatch>, AppError> {
    let message_ids = acknowledge_delivered(&state, &claims.sub, batch.message_ids).await?;
    Ok(Json(DeliveredBatch { message_ids }))
}

/// GET /api/messages/pending
pub async fn pending_route(
    State(state): State<AppState>,
    claims: Claims,
) -> Result<Json<Vec<MessageView>>, AppError> {
    let views = db::run(&state.db, move |conn| {
        let rows = messages::pending_for(conn, &claims.sub)?;
        messages::to_views(conn, rows)
    })
    .await?;
    Ok(Json(views))
}
