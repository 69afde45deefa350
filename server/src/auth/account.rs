//! Email/password accounts: signup, login, logout, session check.

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};

use crate::auth::jwt;
use crate::auth::middleware::Claims;
use crate::auth::password::{self, MIN_PASSWORD_LEN};
use crate::db::{self, models::PublicUser, users};
use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    pub full_name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuthResponse {
    pub user: PublicUser,
    pub token: String,
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn validate_signup(req: &SignupRequest) -> Result<(String, String), AppError> {
    let full_name = req.full_name.trim();
    let email = normalize_email(&req.email);
    if full_name.is_empty() || email.is_empty() || req.password.is_empty() {
        return Err(AppError::validation("All fields are required"));
    }
    if req.password.len() < MIN_PASSWORD_LEN {
        return Err(AppError::validation(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    let valid_email = email
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
    if !valid_email {
        return Err(AppError::validation("Invalid email format"));
    }
    Ok((full_name.to_string(), email))
}

fn issue(state: &AppState, user_id: &str) -> Result<String, AppError> {
    jwt::issue_access_token(&state.jwt_secret, user_id, state.token_ttl_secs)
        .map_err(|e| AppError::Upstream(format!("token signing: {}", e)))
}

/// POST /api/auth/signup
pub async fn signup(
    State(state): State<AppState>,
    Json(req): Json<SignupRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), AppError> {
    let (full_name, email) = validate_signup(&req)?;

    let password = req.password;
    let hash = tokio::task::spawn_blocking(move || password::hash_password(&password)).await??;

    let user = db::run(&state.db, move |conn| {
        users::insert_user(conn, &email, &full_name, &hash, db::now_millis())
    })
    .await?;

    let token = issue(&state, &user.id)?;
    tracing::info!(user_id = %user.id, "Account created");

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            user: PublicUser::from(&user),
            token,
        }),
    ))
}

/// POST /api/auth/login
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    let invalid = || AppError::Unauthenticated("Invalid credentials".to_string());
    let email = normalize_email(&req.email);
    if email.is_empty() || req.password.is_empty() {
        return Err(AppError::validation("Email and password are required"));
    }

    let user = db::run(&state.db, move |conn| users::find_by_email(conn, &email))
        .await?
        .ok_or_else(invalid)?;

    let password = req.password;
    let stored = user.password_hash.clone();
    let ok = tokio::task::spawn_blocking(move || password::verify_password(&password, &stored)).await?;
    if !ok {
        return Err(invalid());
    }

    let token = issue(&state, &user.id)?;
    tracing::debug!(user_id = %user.id, "Login");

    Ok(Json(AuthResponse {
        user: PublicUser::from(&user),
        token,
    }))
}

/// POST /api/auth/logout
///
/// Tokens are stateless; the client discards its copy.
pub async fn logout(_claims: Claims) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "message": "Logged out successfully" }))
}

/// GET /api/auth/check
pub async fn check(
    State(state): State<AppState>,
    claims: Claims,
) -> Result<Json<PublicUser>, AppError> {
    let user = db::run(&state.db, move |conn| users::find_by_id(conn, &claims.sub))
        .await?
        .ok_or_else(|| AppError::Unauthenticated("User not found".to_string()))?;
    Ok(Json(PublicUser::from(&user)))
}
