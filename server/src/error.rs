//! Request/response error kinds and their HTTP rendering.
//!
//! Every handler returns `Result<_, AppError>`. Client-caused kinds carry a
//! human-readable message that is returned verbatim; `Upstream` carries
//! internal detail that is logged and never sent to the caller.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::presence::SessionId;

/// Stable, client-visible error kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    NotFound,
    Unauthenticated,
    Forbidden,
    Conflict,
    Upstream,
}

impl ErrorKind {
    pub const fn status(self) -> StatusCode {
        match self {
            Self::Validation => StatusCode::BAD_REQUEST,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::Conflict => StatusCode::CONFLICT,
            Self::Upstream => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Unauthenticated(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    Conflict(String),

    #[error("upstream failure: {0}")]
    Upstream(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Unauthenticated(_) => ErrorKind::Unauthenticated,
            Self::Forbidden(_) => ErrorKind::Forbidden,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::Upstream(_) => ErrorKind::Upstream,
        }
    }

    /// Message safe to show the caller. Upstream detail is replaced.
    pub fn public_message(&self) -> String {
        match self {
            Self::Upstream(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&AppError> for ErrorBody {
    fn from(err: &AppError) -> Self {
        Self {
            kind: err.kind(),
            message: err.public_message(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let Self::Upstream(detail) = &self {
            tracing::error!(error = %detail, "Upstream failure");
        }
        let status = self.kind().status();
        (status, Json(ErrorBody::from(&self))).into_response()
    }
}

impl From<rusqlite::Error> for AppError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Upstream(format!("database: {}", err))
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Upstream(format!("task join: {}", err))
    }
}

impl From<crate::media::ObjectStoreError> for AppError {
    fn from(err: crate::media::ObjectStoreError) -> Self {
        Self::Upstream(format!("object store: {}", err))
    }
}

/// A push could not reach a session. Never surfaced to callers: the
/// triggering state change has already been persisted.
#[derive(Debug, Error)]
#[error("session {0} is no longer reachable")]
pub struct TransportError(pub SessionId);
