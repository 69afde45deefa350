//! Sidebar summaries: one entry per contact, recomputed on every request.

use std::collections::HashSet;

use axum::{extract::State, Json};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::auth::middleware::Claims;
use crate::db::{self, messages, models::MessageView, models::PublicUser, users};
use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SidebarEntry {
    #[serde(flatten)]
    pub user: PublicUser,
    pub is_online: bool,
    pub last_message: Option<MessageView>,
    pub unread_count: i64,
    pub is_muted: bool,
}

/// Contacts of `requester` excluding blocks in either direction, most
/// recent conversation first. Contacts with no messages follow, by name.
pub fn build_sidebar(
    conn: &Connection,
    requester: &str,
    online: &HashSet<String>,
) -> Result<Vec<SidebarEntry>, AppError> {
    let muted: HashSet<String> = users::muted_ids(conn, requester)?.into_iter().collect();

    let mut entries = Vec::new();
    for contact in users::list_contacts(conn, requester)? {
        let last = messages::last_between(conn, requester, &contact.id)?;
        let last_at = last.as_ref().map(|m| (m.created_at, m.id.clone()));
        let last_message = match last {
            Some(row) => Some(messages::to_view(conn, row)?),
            None => None,
        };
        entries.push((
            last_at,
            SidebarEntry {
                is_online: online.contains(&contact.id),
                unread_count: messages::unread_count(conn, &contact.id, requester)?,
                is_muted: muted.contains(&contact.id),
                last_message,
                user: PublicUser::from(&contact),
            },
        ));
    }

    // Stable: name order from the contact query survives among ties.
    entries.sort_by(|a, b| b.0.cmp(&a.0));
    Ok(entries.into_iter().map(|(_, entry)| entry).collect())
}

/// GET /api/messages/users
pub async fn sidebar_route(
    State(state): State<AppState>,
    claims: Claims,
) -> Result<Json<Vec<SidebarEntry>>, AppError> {
    let online: HashSet<String> = state.presence.online_user_ids().into_iter().collect();
    let entries = db::run(&state.db, move |conn| build_sidebar(conn, &claims.sub, &online)).await?;
    Ok(Json(entries))
}
