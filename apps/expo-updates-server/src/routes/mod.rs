mod assets;
mod manifest;

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use expo_updates_core::{ErrorClass, UpdatesError};
use serde::Serialize;
use serde_json::{json, Value};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, warn};

use crate::metrics;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/manifest", get(manifest::manifest))
        .route("/assets", get(assets::asset));

    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/metrics", get(metrics_handler))
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn index() -> Json<Value> {
    Json(json!({
        "message": "Expo Updates Server",
        "endpoints": {
            "manifest": "/api/manifest",
            "assets": "/api/assets",
        }
    }))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn metrics_handler() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "text/plain")], metrics::gather())
}

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Internal(String),
}

impl ApiError {
    /// Logs and counts a protocol failure on `endpoint` before converting it.
    pub fn record(endpoint: &str, err: UpdatesError) -> Self {
        let class = err.class();
        metrics::record_error(endpoint, class);
        match class {
            ErrorClass::Internal => error!(endpoint, error = %err, "request failed"),
            _ => warn!(endpoint, error = %err, "request rejected"),
        }
        err.into()
    }
}

impl From<UpdatesError> for ApiError {
    fn from(err: UpdatesError) -> Self {
        match err.class() {
            ErrorClass::InvalidRequest => ApiError::BadRequest(err.to_string()),
            ErrorClass::NotFound => ApiError::NotFound(err.to_string()),
            ErrorClass::Internal => ApiError::Internal(err.to_string()),
        }
    }
}

#[derive(Debug, Serialize)]
struct ApiErrorBody<'a> {
    error: &'a str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "internal", msg),
        };
        (status, Json(ApiErrorBody { error, message })).into_response()
    }
}
