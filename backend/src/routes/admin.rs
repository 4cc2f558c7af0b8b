use std::sync::Arc;

use axum::http::HeaderMap;
use axum::{extract::State, routing::get, Json, Router};
use serde_json::{json, Value};

use crate::auth::{authorize, AuthError};
use crate::models::Role;
use crate::AppState;

/// GET /api/admin/users - list all user records. Admin only.
async fn list_users(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Value>, AuthError> {
    let ctx = state.gate.authenticate(&headers).await?;
    authorize(&ctx, &[Role::Admin])?;

    let users = state.users.list().map_err(|e| {
        tracing::error!("User listing failed: {}", e);
        AuthError::Internal
    })?;

    Ok(Json(json!({
        "success": true,
        "count": users.len(),
        "users": users,
    })))
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/admin/users", get(list_users))
        .with_state(state)
}
