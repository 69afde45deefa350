//! GET /media/{key}: serve a stored image. No auth; keys are unguessable
//! content hashes.

use axum::{
    extract::{Path, State},
    http::{header, HeaderValue},
    response::{IntoResponse, Response},
};

use crate::error::AppError;
use crate::media::ObjectStoreError;
use crate::state::AppState;

pub async fn get_media(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Response, AppError> {
    let stored = match state.media.get(&key).await {
        Ok(Some(stored)) => stored,
        Ok(None) | Err(ObjectStoreError::InvalidKey(_)) => {
            return Err(AppError::not_found("Media not found"))
        }
        Err(e) => return Err(e.into()),
    };

    Ok((
        [
            (header::CONTENT_TYPE, HeaderValue::from_static(stored.image_type.mime())),
            (
                header::CACHE_CONTROL,
                HeaderValue::from_static("public, max-age=31536000, immutable"),
            ),
        ],
        stored.bytes,
    )
        .into_response())
}
