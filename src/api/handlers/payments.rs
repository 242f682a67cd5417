use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, Path, State},
    http::HeaderMap,
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::{
    api::{middleware::auth::CurrentUser, state::AppState},
    error::{AppError, Result},
    service::lifecycle::{ConfirmedPayment, CreateIntentRequest, PaymentIntentCreated},
};

pub const SIGNATURE_HEADER: &str = "stripe-signature";

#[derive(Debug, Deserialize)]
pub struct CreateIntentBody {
    #[serde(alias = "planId")]
    pub plan_id: Option<Uuid>,
    pub months: Option<u32>,
    #[serde(alias = "paymentMethod")]
    pub payment_method: Option<String>,
}

pub async fn create_intent(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    payload: std::result::Result<Json<CreateIntentBody>, JsonRejection>,
) -> Response {
    let result: Result<PaymentIntentCreated> = async {
        let Json(body) = payload.map_err(|e| AppError::Validation(e.body_text()))?;

        let plan_id = body
            .plan_id
            .ok_or_else(|| AppError::Validation("planId is required".to_string()))?;
        let payment_method = body
            .payment_method
            .ok_or_else(|| AppError::Validation("paymentMethod is required".to_string()))?;

        state
            .service_context
            .lifecycle
            .create_payment_intent(CreateIntentRequest {
                user_id: current_user.user.id,
                plan_id,
                months: body.months.unwrap_or(1),
                payment_method,
            })
            .await
    }
    .await;

    state.reply(result)
}

pub async fn confirm(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(payment_id): Path<Uuid>,
) -> Response {
    let result: Result<ConfirmedPayment> = async {
        let payment = state
            .service_context
            .ledger
            .find_payment(payment_id)
            .await?
            .filter(|p| p.user_id == current_user.user.id)
            .ok_or_else(|| AppError::NotFound("Payment not found".to_string()))?;

        state.service_context.lifecycle.confirm_payment(payment.id).await
    }
    .await;

    match result {
        Ok(confirmed) if confirmed.already_confirmed => Json(json!({
            "success": true,
            "message": "already confirmed",
            "data": confirmed,
        }))
        .into_response(),
        other => state.reply(other),
    }
}

/// Gateway webhook. Takes the body as raw bytes: the signature covers the
/// exact payload as sent.
pub async fn webhook(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let result = async {
        let signature = headers
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::Signature("Missing Stripe-Signature header".to_string()))?;

        let payload = std::str::from_utf8(&body)
            .map_err(|_| AppError::Validation("Webhook payload is not UTF-8".to_string()))?;

        state
            .service_context
            .lifecycle
            .handle_webhook(payload, signature)
            .await
    }
    .await;

    if let Err(e) = &result {
        tracing::warn!("Webhook rejected: {}", e);
    }

    state.reply(result)
}
