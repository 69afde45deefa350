//! Message rows and the atomic status/deletion updates on them.
//!
//! Every status change is a single conditional UPDATE so concurrent
//! readers, acknowledgers and deleters can never regress or lose a
//! transition.

use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::db::models::{MessageRow, MessageStatus, MessageView, ReplyPreview};
use crate::error::AppError;

const MESSAGE_COLUMNS: &str =
    "m.id, m.sender_id, m.receiver_id, m.text, m.image, m.reply_to, m.status, m.is_deleted, m.created_at";

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    let status: String = row.get(6)?;
    let status = MessageStatus::parse(&status).ok_or_else(|| {
        rusqlite::Error::InvalidColumnType(6, "status".to_string(), rusqlite::types::Type::Text)
    })?;
    Ok(MessageRow {
        id: row.get(0)?,
        sender_id: row.get(1)?,
        receiver_id: row.get(2)?,
        text: row.get(3)?,
        image: row.get(4)?,
        reply_to: row.get(5)?,
        status,
        is_deleted: row.get(7)?,
        created_at: row.get(8)?,
    })
}

pub struct NewMessage<'a> {
    pub sender_id: &'a str,
    pub receiver_id: &'a str,
    pub text: Option<&'a str>,
    pub image: Option<&'a str>,
    pub reply_to: Option<&'a str>,
    pub status: MessageStatus,
}

pub fn insert_message(conn: &Connection, msg: &NewMessage<'_>, now: i64) -> Result<MessageRow, AppError> {
    let id = uuid::Uuid::now_v7().to_string();
    conn.execute(
        "INSERT INTO messages (id, sender_id, receiver_id, text, image, reply_to, status, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
        params![
            id,
            msg.sender_id,
            msg.receiver_id,
            msg.text,
            msg.image,
            msg.reply_to,
            msg.status.as_str(),
            now,
        ],
    )?;
    find(conn, &id)?.ok_or_else(|| AppError::Upstream("inserted message vanished".to_string()))
}

pub fn find(conn: &Connection, id: &str) -> Result<Option<MessageRow>, AppError> {
    let sql = format!("SELECT {MESSAGE_COLUMNS} FROM messages m WHERE m.id = ?1");
    Ok(conn.query_row(&sql, params![id], message_from_row).optional()?)
}

/// Resolve the reply target of `row`, dropping the preview if it is gone.
pub fn to_view(conn: &Connection, row: MessageRow) -> Result<MessageView, AppError> {
    let preview = match row.reply_to.as_deref() {
        Some(target) => find(conn, target)?.as_ref().map(ReplyPreview::from),
        None => None,
    };
    Ok(MessageView::new(row, preview))
}

pub fn to_views(conn: &Connection, rows: Vec<MessageRow>) -> Result<Vec<MessageView>, AppError> {
    rows.into_iter().map(|row| to_view(conn, row)).collect()
}

/// True when `id` is a message exchanged between `a` and `b`.
pub fn belongs_to_pair(conn: &Connection, id: &str, a: &str, b: &str) -> Result<bool, AppError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM messages
         WHERE id = ?1
           AND ((sender_id = ?2 AND receiver_id = ?3) OR (sender_id = ?3 AND receiver_id = ?2))",
        params![id, a, b],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Bulk read: every message from `sender` to `reader` not yet read.
/// Returns the number of rows that moved.
pub fn mark_read_from(conn: &Connection, sender: &str, reader: &str, now: i64) -> Result<usize, AppError> {
    let changed = conn.execute(
        "UPDATE messages SET status = 'read', updated_at = ?3
         WHERE sender_id = ?1 AND receiver_id = ?2 AND status != 'read'",
        params![sender, reader, now],
    )?;
    Ok(changed)
}

/// Delivered batch: move the acknowledged ids addressed to `receiver`
/// from `sent` to `delivered`. Rows already delivered or read are left
/// alone. Returns `(message_id, sender_id)` for each row that moved.
pub fn mark_delivered(
    conn: &Connection,
    receiver: &str,
    message_ids: &[String],
    now: i64,
) -> Result<Vec<(String, String)>, AppError> {
    if message_ids.is_empty() {
        return Ok(Vec::new());
    }
    let ids_json = serde_json::to_string(message_ids)
        .map_err(|e| AppError::Upstream(format!("encode ids: {}", e)))?;

    let mut stmt = conn.prepare(
        "UPDATE messages SET status = 'delivered', updated_at = ?3
         WHERE receiver_id = ?1
           AND status = 'sent'
           AND id IN (SELECT value FROM json_each(?2))
         RETURNING id, sender_id",
    )?;
    let mut moved = stmt
        .query_map(params![receiver, ids_json, now], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<Result<Vec<(String, String)>, _>>()?;
    moved.sort();
    Ok(moved)
}

/// Messages addressed to `receiver` still waiting for a delivery ack.
pub fn pending_for(conn: &Connection, receiver: &str) -> Result<Vec<MessageRow>, AppError> {
    let sql = format!(
        "SELECT {MESSAGE_COLUMNS} FROM messages m
         WHERE m.receiver_id = ?1 AND m.status = 'sent' AND m.is_deleted = 0
           AND NOT EXISTS (SELECT 1 FROM message_deletions d WHERE d.message_id = m.id AND d.user_id = ?1)
         ORDER BY m.created_at ASC, m.id ASC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params![receiver], message_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Delete for everyone: null the content, keep the row.
pub fn soft_delete(conn: &Connection, id: &str, now: i64) -> Result<Option<MessageRow>, AppError> {
    conn.execute(
        "UPDATE messages SET is_deleted = 1, text = NULL, image = NULL, updated_at = ?2 WHERE id = ?1",
        params![id, now],
    )?;
    find(conn, id)
}

/// Delete for one user: add them to the message's deletion set.
pub fn delete_for_user(conn: &Connection, id: &str, user: &str, now: i64) -> Result<(), AppError> {
    conn.execute(
        "INSERT OR IGNORE INTO message_deletions (message_id, user_id, deleted_at) VALUES (?1, ?2, ?3)",
        params![id, user, now],
    )?;
    Ok(())
}

/// Exclusive pagination cursor: position of the oldest message already seen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cursor {
    pub created_at: i64,
    pub id: String,
}

/// One page of the conversation between `viewer` and `other`, newest first,
/// strictly older than `before`, hiding messages the viewer deleted for
/// themselves. Ties on timestamp are broken by id.
pub fn page(
    conn: &Connection,
    viewer: &str,
    other: &str,
    before: Option<&Cursor>,
    limit: usize,
) -> Result<Vec<MessageRow>, AppError> {
    let (cursor_ts, cursor_id) = match before {
        Some(c) => (Some(c.created_at), Some(c.id.as_str())),
        None => (None, None),
    };
    let sql = format!(
        "SELECT {MESSAGE_COLUMNS} FROM messages m
         WHERE ((m.sender_id = ?1 AND m.receiver_id = ?2) OR (m.sender_id = ?2 AND m.receiver_id = ?1))
           AND NOT EXISTS (SELECT 1 FROM message_deletions d WHERE d.message_id = m.id AND d.user_id = ?1)
           AND (?3 IS NULL OR m.created_at < ?3 OR (m.created_at = ?3 AND m.id < ?4))
         ORDER BY m.created_at DESC, m.id DESC
         LIMIT ?5"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(
            params![viewer, other, cursor_ts, cursor_id, limit as i64],
            message_from_row,
        )?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Most recent message between the pair not deleted by `viewer` for themselves.
pub fn last_between(conn: &Connection, viewer: &str, other: &str) -> Result<Option<MessageRow>, AppError> {
    Ok(page(conn, viewer, other, None, 1)?.into_iter().next())
}

/// Messages from `from` to `to` not yet read, excluding deleted ones.
pub fn unread_count(conn: &Connection, from: &str, to: &str) -> Result<i64, AppError> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM messages m
         WHERE m.sender_id = ?1 AND m.receiver_id = ?2
           AND m.status != 'read' AND m.is_deleted = 0
           AND NOT EXISTS (SELECT 1 FROM message_deletions d WHERE d.message_id = m.id AND d.user_id = ?2)",
        params![from, to],
        |row| row.get(0),
    )?;
    Ok(count)
}
