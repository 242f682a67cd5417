pub mod handlers;
pub mod middleware;
pub mod state;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::{
    compression::CompressionLayer,
    cors::CorsLayer,
    trace::TraceLayer,
};
use std::sync::Arc;

use crate::{
    config::Settings,
    service::ServiceContext,
};
use state::AppState;

pub fn create_app(service_context: Arc<ServiceContext>, settings: Arc<Settings>) -> Router {
    let app_state = AppState::new(service_context, settings);

    Router::new()
        // Root and health endpoints
        .route("/", get(handlers::root::root))
        .route("/health", get(handlers::root::health_check))

        .nest("/api", api_routes(app_state.clone()))
        .nest("/admin", admin_routes(app_state.clone()))

        .with_state(app_state)

        // Middleware
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

fn api_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/plans", get(handlers::plans::list))
        .nest("/payments", payment_routes(state.clone()))
        .nest("/subscriptions", subscription_routes(state))
}

fn payment_routes(state: AppState) -> Router<AppState> {
    Router::new()
        // Public webhook endpoint, authenticated by its signature
        .route("/webhook", post(handlers::payments::webhook))
        .merge(
            Router::new()
                .route("/intent", post(handlers::payments::create_intent))
                .route("/:id/confirm", post(handlers::payments::confirm))
                .route_layer(axum::middleware::from_fn_with_state(
                    state,
                    middleware::auth::require_auth,
                )),
        )
}

fn subscription_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/current", get(handlers::subscriptions::current))
        .route("/history", get(handlers::subscriptions::history))
        .route("/:id/cancel", post(handlers::subscriptions::cancel))
        .route_layer(axum::middleware::from_fn_with_state(
            state,
            middleware::auth::require_auth,
        ))
}

fn admin_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/expired-check", post(handlers::admin::check_expired))
        .route("/subscriptions/:id/cancel", post(handlers::admin::cancel_subscription))
        .route("/users/:id/plan", post(handlers::admin::assign_plan))
        .route_layer(axum::middleware::from_fn_with_state(
            state,
            middleware::auth::require_admin,
        ))
}
