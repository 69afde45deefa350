//! REST endpoints for stories.
//!
//! GET    /api/stories            visible, unexpired stories (newest first)
//! POST   /api/stories            create a text or image story
//! POST   /api/stories/{id}/view  record a view
//! DELETE /api/stories/{id}       owner delete

use std::collections::HashSet;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::auth::middleware::Claims;
use crate::db::{self, models::StoryKind, models::StoryView, stories, users};
use crate::error::AppError;
use crate::media;
use crate::state::AppState;
use crate::ws::broadcast::{broadcast_excluding, broadcast_to_all};
use crate::ws::events::ServerEvent;

/// Background for text stories when none is given.
pub const DEFAULT_BG_COLOR: &str = "#1a1a2e";

#[derive(Debug, Deserialize)]
pub struct CreateStoryRequest {
    pub kind: StoryKind,
    /// Text body, or an inline `data:` image for image stories
    pub content: String,
    #[serde(default)]
    pub bg_color: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

fn valid_color(color: &str) -> bool {
    color
        .strip_prefix('#')
        .is_some_and(|hex| matches!(hex.len(), 3 | 6) && hex.chars().all(|c| c.is_ascii_hexdigit()))
}

fn resolve_bg_color(kind: StoryKind, requested: Option<String>) -> Result<Option<String>, AppError> {
    match kind {
        StoryKind::Image => Ok(None),
        StoryKind::Text => match requested.filter(|c| !c.trim().is_empty()) {
            Some(color) if valid_color(color.trim()) => Ok(Some(color.trim().to_string())),
            Some(_) => Err(AppError::validation("Background color must be a hex color")),
            None => Ok(Some(DEFAULT_BG_COLOR.to_string())),
        },
    }
}

/// POST /api/stories
pub async fn create_story(
    State(state): State<AppState>,
    claims: Claims,
    Json(req): Json<CreateStoryRequest>,
) -> Result<(StatusCode, Json<StoryView>), AppError> {
    let content = req.content.trim();
    if content.is_empty() {
        return Err(AppError::validation("kind and content are required"));
    }
    let bg_color = resolve_bg_color(req.kind, req.bg_color)?;
    let content = match req.kind {
        StoryKind::Text => content.to_string(),
        StoryKind::Image => media::upload_inline(state.media.as_ref(), content, state.max_upload_bytes).await?,
    };

    let owner = claims.sub;
    let kind = req.kind;
    let (view, excluded) = db::run(&state.db, move |conn| {
        let row = stories::insert_story(conn, &owner, kind, &content, bg_color.as_deref(), db::now_millis())?;
        let excluded: HashSet<String> = users::blocked_either_ids(conn, &owner)?.into_iter().collect();
        Ok((stories::to_view(conn, row)?, excluded))
    })
    .await?;

    // Same visibility as listing: users on either side of a block never see it.
    let pushed = broadcast_excluding(
        &state.presence,
        &excluded,
        &ServerEvent::NewStory { story: view.clone() },
    );
    tracing::debug!(story_id = %view.id, owner_id = %view.owner.id, pushed, "Story created");

    Ok((StatusCode::CREATED, Json(view)))
}

/// GET /api/stories
pub async fn list_stories(
    State(state): State<AppState>,
    claims: Claims,
) -> Result<Json<Vec<StoryView>>, AppError> {
    let views = db::run(&state.db, move |conn| {
        stories::list_visible(conn, &claims.sub, db::now_millis())
    })
    .await?;
    Ok(Json(views))
}

/// POST /api/stories/{id}/view
pub async fn view_story(
    State(state): State<AppState>,
    claims: Claims,
    Path(story_id): Path<String>,
) -> Result<Json<StoryView>, AppError> {
    let view = db::run(&state.db, move |conn| {
        let now = db::now_millis();
        let story = stories::find(conn, &story_id)?
            .filter(|s| s.expires_at > now)
            .ok_or_else(|| AppError::not_found("Story not found"))?;
        if users::is_blocked_either(conn, &claims.sub, &story.owner_id)? {
            return Err(AppError::not_found("Story not found"));
        }
        stories::add_view(conn, &story, &claims.sub, now)?;
        stories::to_view(conn, story)
    })
    .await?;
    Ok(Json(view))
}

/// DELETE /api/stories/{id}
pub async fn delete_story(
    State(state): State<AppState>,
    claims: Claims,
    Path(story_id): Path<String>,
) -> Result<Json<SuccessResponse>, AppError> {
    let user_id = claims.sub.clone();
    let id = story_id.clone();
    db::run(&state.db, move |conn| {
        let story = stories::find(conn, &id)?.ok_or_else(|| AppError::not_found("Story not found"))?;
        if story.owner_id != user_id {
            return Err(AppError::forbidden("Not your story"));
        }
        stories::delete_story(conn, &id)?;
        Ok(())
    })
    .await?;

    broadcast_to_all(
        &state.presence,
        &ServerEvent::StoryDeleted {
            story_id,
            user_id: claims.sub,
        },
    );
    Ok(Json(SuccessResponse { success: true }))
}
