use axum::{extract::State, response::Response};
use serde::Serialize;

use crate::{
    api::state::AppState,
    domain::{Plan, PlanFeatures},
};

#[derive(Serialize)]
pub struct PlanView {
    #[serde(flatten)]
    pub plan: Plan,
    pub entitlements: PlanFeatures,
}

pub async fn list(State(state): State<AppState>) -> Response {
    let result = state.service_context.plan_repo.list().await.map(|plans| {
        plans
            .into_iter()
            .map(|plan| PlanView {
                entitlements: plan.entitlements(),
                plan,
            })
            .collect::<Vec<_>>()
    });

    state.reply(result)
}
