use std::sync::Arc;

use axum::http::HeaderMap;
use axum::{
    extract::State,
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::auth::AuthError;
use crate::models::{User, UserPatch};
use crate::AppState;

/// GET /api/auth/me - current user, reconciled from the bearer token
async fn me(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Value>, AuthError> {
    let ctx = state.gate.authenticate(&headers).await?;
    let user = load_user(&state, &ctx.user_id)?;

    Ok(Json(json!({
        "success": true,
        "user": user,
    })))
}

#[derive(Debug, Deserialize)]
struct SyncRequest {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    avatar: Option<String>,
}

/// POST /api/auth/sync - apply a client-supplied profile payload to the
/// calling user. Identity fields are not writable here.
async fn sync(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<SyncRequest>,
) -> Result<Json<Value>, AuthError> {
    let ctx = state.gate.authenticate(&headers).await?;

    let patch = UserPatch {
        display_name: request.name.filter(|n| !n.is_empty()),
        avatar_url: request.avatar.filter(|a| !a.is_empty()),
        ..Default::default()
    };

    if !patch.is_empty() {
        state.users.update(&ctx.user_id, &patch).map_err(|e| {
            tracing::error!("Profile sync failed for user {}: {}", ctx.user_id, e);
            AuthError::Internal
        })?;
    }

    let user = load_user(&state, &ctx.user_id)?;

    Ok(Json(json!({
        "success": true,
        "message": "User synced successfully",
        "user": user,
    })))
}

#[derive(Debug, Deserialize)]
struct RewardRequest {
    #[serde(default)]
    amount: i64,
}

/// POST /api/auth/reward - grant experience points to the calling user.
/// The only path that writes `experience_points`.
async fn reward(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<RewardRequest>,
) -> Result<Json<Value>, AuthError> {
    let ctx = state.gate.authenticate(&headers).await?;

    let exp = state
        .users
        .add_experience(&ctx.user_id, request.amount)
        .map_err(|e| {
            tracing::error!("Reward failed for user {}: {}", ctx.user_id, e);
            AuthError::Internal
        })?
        .ok_or(AuthError::Internal)?;

    Ok(Json(json!({
        "success": true,
        "message": "Reward applied",
        "exp": exp,
    })))
}

#[derive(Debug, Deserialize)]
struct UpdateProfileRequest {
    #[serde(default)]
    name: Option<String>,
}

/// PUT /api/auth/update-profile - rename the calling user.
async fn update_profile(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<UpdateProfileRequest>,
) -> Result<Json<Value>, AuthError> {
    let ctx = state.gate.authenticate(&headers).await?;

    let patch = UserPatch {
        display_name: request.name.filter(|n| !n.is_empty()),
        ..Default::default()
    };

    if !patch.is_empty() {
        state.users.update(&ctx.user_id, &patch).map_err(|e| {
            tracing::error!("Profile update failed for user {}: {}", ctx.user_id, e);
            AuthError::Internal
        })?;
    }

    let user = load_user(&state, &ctx.user_id)?;

    Ok(Json(json!({
        "success": true,
        "message": "Profile updated successfully",
        "user": user,
    })))
}

fn load_user(state: &AppState, user_id: &str) -> Result<User, AuthError> {
    state
        .users
        .find_by_id(user_id)
        .map_err(|e| {
            tracing::error!("User lookup failed for {}: {}", user_id, e);
            AuthError::Internal
        })?
        .ok_or(AuthError::Internal)
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/auth/me", get(me))
        .route("/api/auth/sync", post(sync))
        .route("/api/auth/update-profile", put(update_profile))
        .route("/api/auth/reward", post(reward))
        .with_state(state)
}
