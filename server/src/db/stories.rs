//! Ephemeral stories: 24-hour visibility window, viewer sets.

use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::db::models::{from_millis, StoryKind, StoryOwner, StoryRow, StoryView};
use crate::error::AppError;

/// Stories stay visible for this long after creation.
pub const STORY_TTL_MILLIS: i64 = 24 * 60 * 60 * 1000;

const STORY_COLUMNS: &str = "s.id, s.owner_id, s.kind, s.content, s.bg_color, s.created_at, s.expires_at";

fn story_from_row(row: &Row<'_>) -> rusqlite::Result<StoryRow> {
    let kind: String = row.get(2)?;
    let kind = StoryKind::parse(&kind).ok_or_else(|| {
        rusqlite::Error::InvalidColumnType(2, "kind".to_string(), rusqlite::types::Type::Text)
    })?;
    Ok(StoryRow {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        kind,
        content: row.get(3)?,
        bg_color: row.get(4)?,
        created_at: row.get(5)?,
        expires_at: row.get(6)?,
    })
}

pub fn insert_story(
    conn: &Connection,
    owner_id: &str,
    kind: StoryKind,
    content: &str,
    bg_color: Option<&str>,
    now: i64,
) -> Result<StoryRow, AppError> {
    let id = uuid::Uuid::now_v7().to_string();
    conn.execute(
        "INSERT INTO stories (id, owner_id, kind, content, bg_color, created_at, expires_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![id, owner_id, kind.as_str(), content, bg_color, now, now + STORY_TTL_MILLIS],
    )?;
    find(conn, &id)?.ok_or_else(|| AppError::Upstream("inserted story vanished".to_string()))
}

pub fn find(conn: &Connection, id: &str) -> Result<Option<StoryRow>, AppError> {
    let sql = format!("SELECT {STORY_COLUMNS} FROM stories s WHERE s.id = ?1");
    Ok(conn.query_row(&sql, params![id], story_from_row).optional()?)
}

fn viewers(conn: &Connection, story_id: &str) -> Result<Vec<String>, AppError> {
    let mut stmt = conn.prepare(
        "SELECT viewer_id FROM story_views WHERE story_id = ?1 ORDER BY viewed_at, viewer_id",
    )?;
    let ids = stmt
        .query_map(params![story_id], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(ids)
}

/// Attach owner profile and viewer set.
pub fn to_view(conn: &Connection, row: StoryRow) -> Result<StoryView, AppError> {
    let owner = conn
        .query_row(
            "SELECT id, full_name, profile_pic FROM users WHERE id = ?1",
            params![row.owner_id],
            |r| {
                Ok(StoryOwner {
                    id: r.get(0)?,
                    full_name: r.get(1)?,
                    profile_pic: r.get(2)?,
                })
            },
        )
        .optional()?
        .ok_or_else(|| AppError::NotFound("Story owner not found".to_string()))?;
    let viewed_by = viewers(conn, &row.id)?;
    Ok(StoryView {
        id: row.id,
        owner,
        kind: row.kind,
        content: row.content,
        bg_color: row.bg_color,
        created_at: from_millis(row.created_at),
        expires_at: from_millis(row.expires_at),
        viewed_by,
    })
}

/// Unexpired stories visible to `viewer`, newest first. Stories from users
/// on either side of a block are excluded.
pub fn list_visible(conn: &Connection, viewer: &str, now: i64) -> Result<Vec<StoryView>, AppError> {
    let sql = format!(
        "SELECT {STORY_COLUMNS} FROM stories s
         WHERE s.expires_at > ?2
           AND NOT EXISTS (
               SELECT 1 FROM user_blocks b
               WHERE (b.blocker_id = ?1 AND b.blocked_id = s.owner_id)
                  OR (b.blocker_id = s.owner_id AND b.blocked_id = ?1)
           )
         ORDER BY s.created_at DESC, s.id DESC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params![viewer, now], story_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter().map(|row| to_view(conn, row)).collect()
}

/// Record a view. The owner's own views are not recorded.
/// Returns true if a new view was added.
pub fn add_view(conn: &Connection, story: &StoryRow, viewer: &str, now: i64) -> Result<bool, AppError> {
    if story.owner_id == viewer {
        return Ok(false);
    }
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO story_views (story_id, viewer_id, viewed_at) VALUES (?1, ?2, ?3)",
        params![story.id, viewer, now],
    )?;
    Ok(inserted > 0)
}

pub fn delete_story(conn: &Connection, id: &str) -> Result<bool, AppError> {
    let deleted = conn.execute("DELETE FROM stories WHERE id = ?1", params![id])?;
    Ok(deleted > 0)
}

/// Remove every story whose window has closed. Returns the count removed.
pub fn purge_expired(conn: &Connection, now: i64) -> Result<usize, AppError> {
    let deleted = conn.execute("DELETE FROM stories WHERE expires_at <= ?1", params![now])?;
    Ok(deleted)
}
