use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use crate::{
    api::state::AppState,
    domain::User,
    error::{AppError, Result},
};

/// Set by the fronting auth layer once it has authenticated the caller.
pub const USER_ID_HEADER: &str = "x-user-id";

#[derive(Clone)]
pub struct CurrentUser {
    pub user: User,
}

async fn resolve_user(state: &AppState, headers: &HeaderMap) -> Result<User> {
    let user_id = headers
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| Uuid::parse_str(v.trim()).ok())
        .ok_or(AppError::Unauthorized)?;

    state
        .service_context
        .user_repo
        .find_by_id(user_id)
        .await?
        .ok_or(AppError::Unauthorized)
}

pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response> {
    let user = resolve_user(&state, request.headers()).await?;

    request.extensions_mut().insert(CurrentUser { user });

    Ok(next.run(request).await)
}

pub async fn require_admin(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response> {
    let user = resolve_user(&state, request.headers()).await?;

    if !user.is_admin {
        tracing::warn!(user_id = %user.id, "Non-admin attempted an admin action");
        return Err(AppError::Forbidden);
    }

    request.extensions_mut().insert(CurrentUser { user });

    Ok(next.run(request).await)
}
