use axum::{http::StatusCode, Json, response::IntoResponse};
use serde_json::json;

pub async fn root() -> impl IntoResponse {
    Json(json!({
        "name": "Cardly Billing API",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Subscription and payment lifecycle for Cardly digital business cards",
        "status": "operational",
        "endpoints": {
            "health": "/health",
            "plans": "/api/plans",
            "payments": "/api/payments",
            "subscriptions": "/api/subscriptions",
            "admin": "/admin"
        }
    }))
}

pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    })))
}
