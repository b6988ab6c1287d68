use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::ServiceError;
use crate::types::FeatureRow;

use super::AppState;

#[derive(Debug, Deserialize)]
pub struct VersionQuery {
    pub version: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PredictPayload {
    pub instances: Option<Vec<FeatureRow>>,
}

pub async fn root(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "service": state.service_name, "env": state.env }))
}

pub async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(state.coordinator.health())
}

pub async fn predict(
    State(state): State<AppState>,
    Query(query): Query<VersionQuery>,
    Json(payload): Json<PredictPayload>,
) -> Result<Json<Value>, ServiceError> {
    let instances = payload.instances.ok_or_else(|| ServiceError::BadRequest {
        message: "instances field is required".to_string(),
    })?;
    let response = state
        .coordinator
        .predict(instances, query.version)
        .await?;
    Ok(Json(serde_json::to_value(response).expect("response is always serializable")))
}

pub async fn submit_batch(
    State(state): State<AppState>,
    Query(query): Query<VersionQuery>,
    Json(payload): Json<PredictPayload>,
) -> Result<Json<Value>, ServiceError> {
    let instances = payload.instances.ok_or_else(|| ServiceError::BadRequest {
        message: "instances field is required".to_string(),
    })?;
    let job_id = state.coordinator.enqueue_batch(instances, query.version);
    Ok(Json(json!({ "job_id": job_id, "status": "submitted" })))
}

pub async fn batch_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<Value>, ServiceError> {
    Ok(Json(state.coordinator.batch_status(&job_id)?))
}

pub async fn list_models(State(state): State<AppState>) -> Json<Value> {
    Json(state.coordinator.list_models())
}

pub async fn load_model(
    State(state): State<AppState>,
    Path(version): Path<String>,
) -> Result<Json<Value>, ServiceError> {
    state.coordinator.load_model(&version)?;
    Ok(Json(json!({ "status": "loaded", "version": version })))
}

pub async fn promote_model(
    State(state): State<AppState>,
    Path(version): Path<String>,
) -> Result<Json<Value>, ServiceError> {
    state.coordinator.promote_model(&version)?;
    Ok(Json(json!({ "status": "promoted", "version": version })))
}

pub async fn unload_model(
    State(state): State<AppState>,
    Path(version): Path<String>,
) -> Result<Json<Value>, ServiceError> {
    state.coordinator.unload_model(&version)?;
    Ok(Json(json!({ "status": "unloaded", "version": version })))
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = match &self {
            ServiceError::NotFound { .. } => StatusCode::NOT_FOUND,
            ServiceError::JobNotFound { .. } => StatusCode::NOT_FOUND,
            ServiceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            ServiceError::CannotUnloadDefault { .. } => StatusCode::BAD_REQUEST,
            ServiceError::QueueFull => StatusCode::SERVICE_UNAVAILABLE,
            ServiceError::BreakerOpen => StatusCode::SERVICE_UNAVAILABLE,
            ServiceError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}
