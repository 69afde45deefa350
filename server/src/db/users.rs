//! User rows, block lists and mute lists.

use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::db::models::UserRow;
use crate::error::AppError;

const USER_COLUMNS: &str =
    "id, email, full_name, password_hash, profile_pic, about, last_seen, created_at";

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        email: row.get(1)?,
        full_name: row.get(2)?,
        password_hash: row.get(3)?,
        profile_pic: row.get(4)?,
        about: row.get(5)?,
        last_seen: row.get(6)?,
        created_at: row.get(7)?,
    })
}

/// Create an account. Duplicate emails are a conflict.
pub fn insert_user(
    conn: &Connection,
    email: &str,
    full_name: &str,
    password_hash: &str,
    now: i64,
) -> Result<UserRow, AppError> {
    if find_by_email(conn, email)?.is_some() {
        return Err(AppError::Conflict("Email already exists".to_string()));
    }

    let id = uuid::Uuid::now_v7().to_string();
    let inserted = conn.execute(
        "INSERT INTO users (id, email, full_name, password_hash, last_seen, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?5, ?5)",
        params![id, email, full_name, password_hash, now],
    );
    match inserted {
        Ok(_) => {}
        // Lost a race with a concurrent signup for the same email.
        Err(rusqlite::Error::SqliteFailure(e, _))
            if e.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            return Err(AppError::Conflict("Email already exists".to_string()));
        }
        Err(e) => return Err(e.into()),
    }

    find_by_id(conn, &id)?.ok_or_else(|| AppError::Upstream("inserted user vanished".to_string()))
}

pub fn find_by_id(conn: &Connection, id: &str) -> Result<Option<UserRow>, AppError> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1");
    Ok(conn.query_row(&sql, params![id], user_from_row).optional()?)
}

pub fn find_by_email(conn: &Connection, email: &str) -> Result<Option<UserRow>, AppError> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1");
    Ok(conn.query_row(&sql, params![email], user_from_row).optional()?)
}

pub fn exists(conn: &Connection, id: &str) -> Result<bool, AppError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM users WHERE id = ?1",
        params![id],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Apply the provided profile fields. Returns the updated row.
pub fn update_profile(
    conn: &Connection,
    id: &str,
    profile_pic: Option<&str>,
    about: Option<&str>,
    now: i64,
) -> Result<Option<UserRow>, AppError> {
    conn.execute(
        "UPDATE users
         SET profile_pic = COALESCE(?2, profile_pic),
             about = COALESCE(?3, about),
             updated_at = ?4
         WHERE id = ?1",
        params![id, profile_pic, about, now],
    )?;
    find_by_id(conn, id)
}

/// Stamp last-seen. Returns false if the user no longer exists.
pub fn touch_last_seen(conn: &Connection, id: &str, now: i64) -> Result<bool, AppError> {
    let changed = conn.execute(
        "UPDATE users SET last_seen = ?2 WHERE id = ?1",
        params![id, now],
    )?;
    Ok(changed > 0)
}

pub fn set_push_subscription(
    conn: &Connection,
    id: &str,
    subscription: Option<&str>,
    now: i64,
) -> Result<(), AppError> {
    conn.execute(
        "UPDATE users SET push_subscription = ?2, updated_at = ?3 WHERE id = ?1",
        params![id, subscription, now],
    )?;
    Ok(())
}


// --- blocks ---

pub fn add_block(conn: &Connection, blocker: &str, blocked: &str, now: i64) -> Result<(), AppError> {
    conn.execute(
        "INSERT OR IGNORE INTO user_blocks (blocker_id, blocked_id, created_at) VALUES (?1, ?2, ?3)",
        params![blocker, blocked, now],
    )?;
    Ok(())
}

pub fn remove_block(conn: &Connection, blocker: &str, blocked: &str) -> Result<(), AppError> {
    conn.execute(
        "DELETE FROM user_blocks WHERE blocker_id = ?1 AND blocked_id = ?2",
        params![blocker, blocked],
    )?;
    Ok(())
}

pub fn blocked_ids(conn: &Connection, blocker: &str) -> Result<Vec<String>, AppError> {
    let mut stmt = conn.prepare(
        "SELECT blocked_id FROM user_blocks WHERE blocker_id = ?1 ORDER BY created_at, blocked_id",
    )?;
    let ids = stmt
        .query_map(params![blocker], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(ids)
}

/// True when either user has blocked the other.
pub fn is_blocked_either(conn: &Connection, a: &str, b: &str) -> Result<bool, AppError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM user_blocks
         WHERE (blocker_id = ?1 AND blocked_id = ?2) OR (blocker_id = ?2 AND blocked_id = ?1)",
        params![a, b],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Users on either side of a block with `user`.
pub fn blocked_either_ids(conn: &Connection, user: &str) -> Result<Vec<String>, AppError> {
    let mut stmt = conn.prepare(
        "SELECT blocked_id FROM user_blocks WHERE blocker_id = ?1
         UNION
         SELECT blocker_id FROM user_blocks WHERE blocked_id = ?1",
    )?;
    let ids = stmt
        .query_map(params![user], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(ids)
}

// --- mutes ---

pub fn add_mute(conn: &Connection, user: &str, muted: &str, now: i64) -> Result<(), AppError> {
    conn.execute(
        "INSERT OR IGNORE INTO user_mutes (user_id, muted_id, created_at) VALUES (?1, ?2, ?3)",
        params![user, muted, now],
    )?;
    Ok(())
}

pub fn remove_mute(conn: &Connection, user: &str, muted: &str) -> Result<(), AppError> {
    conn.execute(
        "DELETE FROM user_mutes WHERE user_id = ?1 AND muted_id = ?2",
        params![user, muted],
    )?;
    Ok(())
}

pub fn muted_ids(conn: &Connection, user: &str) -> Result<Vec<String>, AppError> {
    let mut stmt = conn.prepare(
        "SELECT muted_id FROM user_mutes WHERE user_id = ?1 ORDER BY created_at, muted_id",
    )?;
    let ids = stmt
        .query_map(params![user], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(ids)
}

/// Every other user with no block in either direction.
pub fn list_contacts(conn: &Connection, requester: &str) -> Result<Vec<UserRow>, AppError> {
    let sql = format!(
        "SELECT {USER_COLUMNS} FROM users u
         WHERE u.id != ?1
           AND NOT EXISTS (
               SELECT 1 FROM user_blocks b
               WHERE (b.blocker_id = ?1 AND b.blocked_id = u.id)
                  OR (b.blocker_id = u.id AND b.blocked_id = ?1)
           )
         ORDER BY u.full_name, u.id"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params![requester], user_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}
