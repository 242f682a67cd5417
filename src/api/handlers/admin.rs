use axum::{
    extract::{rejection::JsonRejection, Path, State},
    response::Response,
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    api::{middleware::auth::CurrentUser, state::AppState},
    domain::{CancelActor, Subscription},
    error::{AppError, Result},
    service::lifecycle::AssignPlanRequest,
};

#[derive(Debug, Deserialize)]
pub struct AssignPlanBody {
    #[serde(alias = "planId")]
    pub plan_id: Option<Uuid>,
    pub duration: Option<String>,
    pub unit: Option<String>,
}

#[derive(Serialize)]
pub struct AssignedPlan {
    /// `None` when the user was moved back to Free.
    pub subscription: Option<Subscription>,
}

#[derive(Serialize)]
pub struct SweepReport {
    pub expired: usize,
}

pub async fn cancel_subscription(
    State(state): State<AppState>,
    Extension(admin): Extension<CurrentUser>,
    Path(subscription_id): Path<Uuid>,
) -> Response {
    tracing::info!(admin_id = %admin.user.id, %subscription_id, "Admin cancel requested");

    let result = state
        .service_context
        .lifecycle
        .cancel_subscription(subscription_id, CancelActor::Admin)
        .await;

    state.reply(result)
}

pub async fn assign_plan(
    State(state): State<AppState>,
    Extension(admin): Extension<CurrentUser>,
    Path(user_id): Path<Uuid>,
    payload: std::result::Result<Json<AssignPlanBody>, JsonRejection>,
) -> Response {
    let result: Result<AssignedPlan> = async {
        let Json(body) = payload.map_err(|e| AppError::Validation(e.body_text()))?;

        let plan_id = body
            .plan_id
            .ok_or_else(|| AppError::Validation("planId is required".to_string()))?;
        let duration = body
            .duration
            .ok_or_else(|| AppError::Validation("duration is required".to_string()))?;

        tracing::info!(admin_id = %admin.user.id, %user_id, %plan_id, "Admin plan assignment requested");

        let subscription = state
            .service_context
            .lifecycle
            .assign_plan(AssignPlanRequest {
                user_id,
                plan_id,
                duration,
                unit: body.unit.unwrap_or_else(|| "days".to_string()),
            })
            .await?;

        Ok(AssignedPlan { subscription })
    }
    .await;

    state.reply(result)
}

pub async fn check_expired(State(state): State<AppState>) -> Response {
    let result = state
        .service_context
        .lifecycle
        .sweep_expired()
        .await
        .map(|expired| SweepReport { expired });

    state.reply(result)
}
