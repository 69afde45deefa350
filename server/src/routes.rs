use axum::{
    extract::{DefaultBodyLimit, State},
    middleware,
    routing::{delete, get, post, put},
    Router,
};
use std::sync::Arc;
use tower_governor::key_extractor::PeerIpKeyExtractor;
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};

use crate::auth::account;
use crate::auth::middleware::JwtSecret;
use crate::dm::{history, messages, receipts, sidebar};
use crate::media;
use crate::state::AppState;
use crate::stories;
use crate::users::{profile, relations};
use crate::ws::handler as ws_handler;

/// Headroom for JSON framing around a base64 image.
const BODY_OVERHEAD_BYTES: usize = 64 * 1024;

/// Inject the JWT secret into request extensions so the Claims extractor can find it.
async fn inject_jwt_secret(
    State(state): State<AppState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: middleware::Next,
) -> axum::response::Response {
    req.extensions_mut()
        .insert(JwtSecret(state.jwt_secret.clone()));
    next.run(req).await
}

/// Build the full axum Router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    // Signup/login routes, rate limited per IP.
    // Uses PeerIpKeyExtractor which reads from ConnectInfo<SocketAddr>
    let mut auth_routes = Router::new()
        .route("/api/auth/signup", post(account::signup))
        .route("/api/auth/login", post(account::login));

    let limit = state.auth_rate_limit;
    match GovernorConfigBuilder::default()
        .key_extractor(PeerIpKeyExtractor)
        .per_second(limit.per_second)
        .burst_size(limit.burst)
        .finish()
    {
        Some(config) => {
            let governor_config = Arc::new(config);

            // Spawn background task to clean up rate limiter state
            let limiter_for_cleanup = governor_config.limiter().clone();
            tokio::spawn(async move {
                loop {
                    tokio::time::sleep(std::time::Duration::from_secs(60)).await;
                    limiter_for_cleanup.retain_recent();
                }
            });

            auth_routes = auth_routes.layer(GovernorLayer {
                config: governor_config,
            });
        }
        None => {
            tracing::warn!(
                per_second = limit.per_second,
                burst = limit.burst,
                "Invalid auth rate limit settings, signup/login are not rate limited"
            );
        }
    }

    let session_routes = Router::new()
        .route("/api/auth/logout", post(account::logout))
        .route("/api/auth/check", get(account::check));

    let user_routes = Router::new()
        .route("/api/users/profile", put(profile::update_profile))
        .route(
            "/api/users/push-subscription",
            post(profile::save_push_subscription),
        )
        .route(
            "/api/users/block/{id}",
            post(relations::block_user).delete(relations::unblock_user),
        )
        .route(
            "/api/users/mute/{id}",
            post(relations::mute_chat).delete(relations::unmute_chat),
        );

    // Static segments take priority over /api/messages/{id}.
    let message_routes = Router::new()
        .route("/api/messages/users", get(sidebar::sidebar_route))
        .route("/api/messages/pending", get(receipts::pending_route))
        .route("/api/messages/delivered", post(receipts::delivered_route))
        .route("/api/messages/send/{id}", post(messages::send_message_route))
        .route("/api/messages/read/{id}", put(receipts::mark_read_route))
        .route(
            "/api/messages/{id}",
            get(history::history_route).delete(messages::delete_message_route),
        );

    let story_routes = Router::new()
        .route(
            "/api/stories",
            get(stories::routes::list_stories).post(stories::routes::create_story),
        )
        .route("/api/stories/{id}/view", post(stories::routes::view_story))
        .route("/api/stories/{id}", delete(stories::routes::delete_story));

    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/health", get(health_check))
        .route("/media/{key}", get(media::routes::get_media));

    // WebSocket endpoint (auth via query param, not JWT header)
    let ws_routes = Router::new().route("/ws", get(ws_handler::ws_upgrade));

    let body_limit = state.max_upload_bytes / 3 * 4 + BODY_OVERHEAD_BYTES;

    Router::new()
        .merge(auth_routes)
        .merge(session_routes)
        .merge(user_routes)
        .merge(message_routes)
        .merge(story_routes)
        .merge(public_routes)
        .merge(ws_routes)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            inject_jwt_secret,
        ))
        .with_state(state)
}

/// Basic health check endpoint
async fn health_check() -> &'static str {
    "ok"
}
