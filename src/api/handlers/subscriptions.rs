use axum::{
    extract::{Path, State},
    response::Response,
    Extension,
};
use uuid::Uuid;

use crate::{
    api::{middleware::auth::CurrentUser, state::AppState},
    domain::CancelActor,
    error::{AppError, Result},
    service::lifecycle::Cancellation,
};

pub async fn current(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
) -> Response {
    let result = state
        .service_context
        .lifecycle
        .current_subscription(current_user.user.id)
        .await;

    state.reply(result)
}

pub async fn history(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
) -> Response {
    let result = state
        .service_context
        .lifecycle
        .subscription_history(current_user.user.id)
        .await;

    state.reply(result)
}

pub async fn cancel(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(subscription_id): Path<Uuid>,
) -> Response {
    let result: Result<Cancellation> = async {
        // Someone else's subscription is reported as missing.
        state
            .service_context
            .ledger
            .find_subscription(subscription_id)
            .await?
            .filter(|s| s.user_id == current_user.user.id)
            .ok_or_else(|| AppError::NotFound("Subscription not found".to_string()))?;

        state
            .service_context
            .lifecycle
            .cancel_subscription(subscription_id, CancelActor::User)
            .await
    }
    .await;

    state.reply(result)
}
