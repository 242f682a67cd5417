use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden")]
    Forbidden,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Payment declined: {0}")]
    PaymentDeclined(String),

    #[error("Gateway error: {0}")]
    Gateway(String),

    #[error("Invalid webhook signature: {0}")]
    Signature(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Database(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::Validation(_) | AppError::Signature(_) => StatusCode::BAD_REQUEST,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::PaymentDeclined(_) => StatusCode::PAYMENT_REQUIRED,
            AppError::Gateway(_) => StatusCode::BAD_GATEWAY,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Builds the `{success: false, ...}` envelope. Storage, gateway and
    /// internal failures only carry their detail when `expose_details` is set.
    pub fn into_envelope(self, expose_details: bool) -> Response {
        let status = self.status_code();
        let (message, detail) = match &self {
            AppError::Database(msg) => {
                tracing::error!("Database error: {}", msg);
                ("Database error occurred".to_string(), Some(msg.clone()))
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                ("Internal server error".to_string(), Some(msg.clone()))
            }
            AppError::Gateway(msg) => {
                tracing::error!("Payment gateway error: {}", msg);
                ("Payment provider unavailable, please retry".to_string(), Some(msg.clone()))
            }
            AppError::Unauthorized => ("Unauthorized".to_string(), None),
            AppError::Forbidden => ("Forbidden".to_string(), None),
            AppError::NotFound(msg)
            | AppError::Validation(msg)
            | AppError::Conflict(msg)
            | AppError::PaymentDeclined(msg)
            | AppError::Signature(msg)
            | AppError::ServiceUnavailable(msg) => (msg.clone(), None),
        };

        let body = match detail.filter(|_| expose_details) {
            Some(detail) => json!({ "success": false, "error": message, "detail": detail }),
            None => json!({ "success": false, "error": message }),
        };

        (status, Json(body)).into_response()
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        self.into_envelope(false)
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Database(err.to_string())
    }
}

impl From<sqlx::migrate::MigrateError> for AppError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        AppError::Database(err.to_string())
    }
}
