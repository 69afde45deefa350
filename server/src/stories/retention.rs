//! Background purge of expired stories.
//!
//! Listing already hides expired rows; this task only reclaims them.

use crate::db::{self, stories, DbPool};

/// Spawn a background task that periodically deletes expired stories.
pub fn spawn_story_purge(db: DbPool, interval_secs: u64) {
    let interval = std::time::Duration::from_secs(interval_secs.max(1));

    tokio::spawn(async move {
        loop {
            tokio::time::sleep(interval).await;

            match db::run(&db, |conn| stories::purge_expired(conn, db::now_millis())).await {
                Ok(count) if count > 0 => {
                    tracing::info!("Story cleanup: purged {} expired stories", count);
                }
                Ok(_) => {
                    tracing::debug!("Story cleanup: no expired stories");
                }
                Err(e) => {
                    tracing::error!("Story cleanup error: {}", e);
                }
            }
        }
    });
}
