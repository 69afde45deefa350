use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::db::DbPool;
use crate::media::{LocalObjectStore, ObjectStore};
use crate::presence::{PresenceRegistry, TypingTracker};

/// Per-IP rate limit applied to the signup/login routes.
#[derive(Debug, Clone, Copy)]
pub struct RateLimit {
    /// Seconds between replenished tokens
    pub per_second: u64,
    pub burst: u32,
}

/// Shared application state passed to all handlers via axum State extractor.
#[derive(Clone)]
pub struct AppState {
    /// SQLite connection wrapped in Arc<Mutex>
    pub db: DbPool,
    /// JWT signing secret (256-bit random key)
    pub jwt_secret: Vec<u8>,
    pub token_ttl_secs: i64,
    /// Live sessions per user
    pub presence: Arc<PresenceRegistry>,
    /// Open typing indicators with server-side expiry
    pub typing: Arc<TypingTracker>,
    /// Image storage
    pub media: Arc<dyn ObjectStore>,
    /// Maximum decoded size of an inline image
    pub max_upload_bytes: usize,
    pub auth_rate_limit: RateLimit,
}

impl AppState {
    pub fn from_config(config: &Config, db: DbPool, jwt_secret: Vec<u8>) -> Self {
        let auth = config.auth.clone().unwrap_or_default();
        let media = config.media.clone().unwrap_or_default();
        let presence_config = config.presence.clone().unwrap_or_default();

        let presence = Arc::new(PresenceRegistry::new());
        let typing = Arc::new(TypingTracker::new(
            presence.clone(),
            Duration::from_millis(presence_config.typing_quiet_ms),
        ));

        Self {
            db,
            jwt_secret,
            token_ttl_secs: auth.token_ttl_secs,
            presence,
            typing,
            media: Arc::new(LocalObjectStore::new(&config.data_dir)),
            max_upload_bytes: media.max_upload_size_mb as usize * 1024 * 1024,
            auth_rate_limit: RateLimit {
                per_second: auth.rate_limit_per_second,
                burst: auth.rate_limit_burst,
            },
        }
    }
}
