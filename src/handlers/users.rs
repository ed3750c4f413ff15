use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use super::read_body;
use crate::db;
use crate::error::AppError;
use crate::middleware::{Authenticated, AUTH_HEADER};
use crate::models::{Credentials, Purpose, StoredToken, User};
use crate::validate::{normalize_email, validate_password};
use crate::AppState;

pub async fn signup(
    State(state): State<AppState>,
    body: Result<Json<Credentials>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let req = read_body(body)?;
    let email = normalize_email(&req.email)?;
    validate_password(&req.password)?;

    let hasher = state.hasher.clone();
    let password = req.password;
    let password_hash = tokio::task::spawn_blocking(move || hasher.hash(&password)).await??;

    let id = Uuid::new_v4();
    let token = state.tokens.sign(id)?;
    let first = StoredToken {
        token: token.clone(),
        purpose: Purpose::Access,
    };
    let user = db::create_user_with_token(&state.db, id, &email, &password_hash, first)?;
    info!(user_id = %user.id, "User signed up");

    Ok(with_token(token, user))
}

pub async fn login(
    State(state): State<AppState>,
    body: Result<Json<Credentials>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let req = read_body(body)?;
    let email = req.email.trim().to_lowercase();
    let hasher = state.hasher.clone();
    let password = req.password;

    let Some(user) = db::find_user_by_email(&state.db, &email)? else {
        tokio::task::spawn_blocking(move || hasher.verify_decoy(&password)).await?;
        warn!("Login for unknown email");
        return Err(AppError::InvalidCredentials);
    };

    let stored = user.password_hash.clone();
    if !tokio::task::spawn_blocking(move || hasher.verify(&password, &stored)).await?? {
        warn!(user_id = %user.id, "Login with wrong password");
        return Err(AppError::InvalidCredentials);
    }

    let token = state.tokens.issue(&state.db, user.id)?;
    info!(user_id = %user.id, "User logged in");

    Ok(with_token(token, user))
}

pub async fn profile(Authenticated { user, .. }: Authenticated) -> Json<User> {
    Json(user)
}

pub async fn logout(
    Authenticated { user, token }: Authenticated,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    state.tokens.revoke(&state.db, user.id, &token)?;
    info!(user_id = %user.id, "User logged out");
    Ok(Json(json!({ "success": true })))
}

fn with_token(token: String, user: User) -> impl IntoResponse {
    ([(AUTH_HEADER, token)], Json(json!({ "user": user })))
}
