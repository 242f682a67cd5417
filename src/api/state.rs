use std::sync::Arc;

use axum::{
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;

use crate::{
    config::Settings,
    error::{AppError, Result},
    service::ServiceContext,
};

#[derive(Clone)]
pub struct AppState {
    pub service_context: Arc<ServiceContext>,
    pub settings: Arc<Settings>,
}

impl AppState {
    pub fn new(service_context: Arc<ServiceContext>, settings: Arc<Settings>) -> Self {
        Self {
            service_context,
            settings,
        }
    }

    /// Wraps a handler result in the `{success, data|error}` envelope.
    pub fn reply<T: Serialize>(&self, result: Result<T>) -> Response {
        match result {
            Ok(data) => Json(json!({ "success": true, "data": data })).into_response(),
            Err(e) => self.failure(e),
        }
    }

    pub fn failure(&self, error: AppError) -> Response {
        error.into_envelope(self.settings.app.is_development())
    }
}
