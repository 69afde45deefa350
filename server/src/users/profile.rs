use axum::{extract::State, Json};
use serde::Deserialize;

use crate::auth::middleware::Claims;
use crate::db::{self, models::PublicUser, users};
use crate::error::AppError;
use crate::media;
use crate::state::AppState;

const MAX_ABOUT_LEN: usize = 140;

#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    /// Inline `data:` image, uploaded and replaced by its URL
    #[serde(default)]
    pub profile_pic: Option<String>,
    #[serde(default)]
    pub about: Option<String>,
}

/// PUT /api/users/profile
pub async fn update_profile(
    State(state): State<AppState>,
    claims: Claims,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<Json<PublicUser>, AppError> {
    let pic_data = req.profile_pic.filter(|p| !p.trim().is_empty());
    if pic_data.is_none() && req.about.is_none() {
        return Err(AppError::validation("Nothing to update"));
    }
    let about = req.about.map(|a| a.trim().to_string());
    if about.as_ref().is_some_and(|a| a.chars().count() > MAX_ABOUT_LEN) {
        return Err(AppError::validation(format!(
            "About must be at most {} characters",
            MAX_ABOUT_LEN
        )));
    }

    let pic_url = match pic_data {
        Some(data) => Some(media::upload_inline(state.media.as_ref(), &data, state.max_upload_bytes).await?),
        None => None,
    };

    let user_id = claims.sub;
    let user = db::run(&state.db, move |conn| {
        users::update_profile(
            conn,
            &user_id,
            pic_url.as_deref(),
            about.as_deref(),
            db::now_millis(),
        )
    })
    .await?
    .ok_or_else(|| AppError::not_found("User not found"))?;

    Ok(Json(PublicUser::from(&user)))
}

#[derive(Debug, Deserialize)]
pub struct PushSubscriptionRequest {
    /// Opaque Web Push subscription object; `null` clears it
    pub subscription: Option<serde_json::Value>,
}

/// POST /api/users/push-subscription
pub async fn save_push_subscription(
    State(state): State<AppState>,
    claims: Claims,
    Json(req): Json<PushSubscriptionRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let encoded = req
        .subscription
        .filter(|v| !v.is_null())
        .map(|v| v.to_string());
    let user_id = claims.sub;
    db::run(&state.db, move |conn| {
        users::set_push_subscription(conn, &user_id, encoded.as_deref(), db::now_millis())
    })
    .await?;
    Ok(Json(serde_json::json!({ "success": true })))
}
