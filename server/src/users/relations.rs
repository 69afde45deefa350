//! Block and mute lists. Each operation is an atomic set add/remove and
//! returns the caller's resulting list.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;

use crate::auth::middleware::Claims;
use crate::db::{self, users};
use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct BlockedUsers {
    pub blocked_users: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct MutedChats {
    pub muted_chats: Vec<String>,
}

fn check_target(conn: &rusqlite::Connection, me: &str, target: &str) -> Result<(), AppError> {
    if me == target {
        return Err(AppError::validation("You cannot target yourself"));
    }
    if !users::exists(conn, target)? {
        return Err(AppError::not_found("User not found"));
    }
    Ok(())
}

/// POST /api/users/block/{id}
pub async fn block_user(
    State(state): State<AppState>,
    claims: Claims,
    Path(target): Path<String>,
) -> Result<Json<BlockedUsers>, AppError> {
    let me = claims.sub;
    let blocked_users = db::run(&state.db, move |conn| {
        check_target(conn, &me, &target)?;
        users::add_block(conn, &me, &target, db::now_millis())?;
        tracing::debug!(user_id = %me, blocked_id = %target, "Blocked user");
        users::blocked_ids(conn, &me)
    })
    .await?;
    Ok(Json(BlockedUsers { blocked_users }))
}

/// DELETE /api/users/block/{id}
pub async fn unblock_user(
    State(state): State<AppState>,
    claims: Claims,
    Path(target): Path<String>,
) -> Result<Json<BlockedUsers>, AppError> {
    let me = claims.sub;
    let blocked_users = db::run(&state.db, move |conn| {
        users::remove_block(conn, &me, &target)?;
        users::blocked_ids(conn, &me)
    })
    .await?;
    Ok(Json(BlockedUsers { blocked_users }))
}

/// POST /api/users/mute/{id}
pub async fn mute_chat(
    State(state): State<AppState>,
    claims: Claims,
    Path(target): Path<String>,
) -> Result<Json<MutedChats>, AppError> {
    let me = claims.sub;
    let muted_chats = db::run(&state.db, move |conn| {
        check_target(conn, &me, &target)?;
        users::add_mute(conn, &me, &target, db::now_millis())?;
        users::muted_ids(conn, &me)
    })
    .await?;
    Ok(Json(MutedChats { muted_chats }))
}

/// DELETE /api/users/mute/{id}
pub async fn unmute_chat(
    State(state): State<AppState>,
    claims: Claims,
    Path(target): Path<String>,
) -> Result<Json<MutedChats>, AppError> {
    let me = claims.sub;
    let muted_chats = db::run(&state.db, move |conn| {
        users::remove_mute(conn, &me, &target)?;
        users::muted_ids(conn, &me)
    })
    .await?;
    Ok(Json(MutedChats { muted_chats }))
}
