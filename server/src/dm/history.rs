//! Cursor-paginated conversation history.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::auth::middleware::Claims;
use crate::db::{self, messages, models::MessageView, users};
use crate::error::AppError;
use crate::state::AppState;

/// Default page size for message history.
pub const DEFAULT_LIMIT: usize = 30;
/// Maximum page size for message history.
pub const MAX_LIMIT: usize = 100;

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    /// Id of the oldest message already held; the page is strictly older.
    pub before: Option<String>,
    /// Parsed leniently: anything non-numeric or zero means the default.
    pub limit: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HistoryPage {
    /// Chronological (oldest first)
    pub messages: Vec<MessageView>,
    /// True when the page came back full. A full final page reports true
    /// once; the next fetch is then empty.
    pub has_more: bool,
}

pub fn clamp_limit(raw: Option<&str>) -> usize {
    match raw.and_then(|s| s.trim().parse::<usize>().ok()) {
        Some(0) | None => DEFAULT_LIMIT,
        Some(n) => n.min(MAX_LIMIT),
    }
}

/// Load one page of the `viewer`/`other` conversation.
pub fn load_page(
    conn: &Connection,
    viewer: &str,
    other: &str,
    before: Option<&str>,
    limit: usize,
) -> Result<HistoryPage, AppError> {
    let cursor = match before {
        Some(id) => {
            let row = messages::find(conn, id)?
                .filter(|row| row.is_between(viewer, other))
                .ok_or_else(|| AppError::not_found("Cursor message not found"))?;
            Some(messages::Cursor {
                created_at: row.created_at,
                id: row.id,
            })
        }
        None => None,
    };

    let mut rows = messages::page(conn, viewer, other, cursor.as_ref(), limit)?;
    let has_more = rows.len() == limit;
    rows.reverse();

    Ok(HistoryPage {
        messages: messages::to_views(conn, rows)?,
        has_more,
    })
}

/// GET /api/messages/{id}?before=&limit=
pub async fn history_route(
    State(state): State<AppState>,
    claims: Claims,
    Path(other_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<HistoryPage>, AppError> {
    let limit = clamp_limit(query.limit.as_deref());
    let page = db::run(&state.db, move |conn| {
        if !users::exists(conn, &other_id)? {
            return Err(AppError::not_found("User not found"));
        }
        load_page(conn, &claims.sub, &other_id, query.before.as_deref(), limit)
    })
    .await?;
    Ok(Json(page))
}
