//! Health, readiness, and metrics endpoints. No per-user identity exists in
//! this service; these are operational surfaces for the platform, not the
//! Scheduler's authenticated cron endpoints.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};

use crate::health::{liveness_check, readiness_check};
use crate::AppState;

pub async fn health_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    let response = state.monitoring.comprehensive_check(&state.db).await;
    Json(serde_json::json!(response))
}

pub async fn readiness_handler(State(state): State<AppState>) -> impl IntoResponse {
    match readiness_check(&state.db).await {
        Ok(()) => (StatusCode::OK, Json(serde_json::json!({ "ready": true }))),
        Err(err) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({ "ready": false, "error": err.to_string() })),
        ),
    }
}

pub async fn liveness_handler() -> impl IntoResponse {
    match liveness_check().await {
        Ok(()) => StatusCode::OK,
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    state.monitoring.db_metrics().update_pool_metrics(&state.db);
    match state.monitoring.metrics().get_metrics() {
        Ok(body) => (StatusCode::OK, body),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
    }
}
