//! HTTP surface: one axum router over the [`InferenceCoordinator`].
//!
//! Every handler does exactly three things — extract, call the
//! coordinator, convert the result — so the status-code mapping in
//! [`crate::error::ServiceError`]'s `IntoResponse` impl is the single
//! place request outcomes get translated into wire responses.

mod handlers;

use std::sync::Arc;

use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::coordinator::InferenceCoordinator;

#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<InferenceCoordinator>,
    pub service_name: String,
    pub env: String,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .route("/predict", post(handlers::predict))
        .route("/batch", post(handlers::submit_batch))
        .route("/batch/:job_id", get(handlers::batch_status))
        .route("/admin/models", get(handlers::list_models))
        .route("/admin/models/:version/load", post(handlers::load_model))
        .route("/admin/models/:version/promote", post(handlers::promote_model))
        .route("/admin/models/:version", delete(handlers::unload_model))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
