//! The Scheduler's three cron endpoints. Each clamps its request params to
//! the endpoint's configured caps before invoking the stage sequence.

use axum::{extract::Query, extract::State, Json};
use serde::Deserialize;
use serde_json::json;

use crate::services::news_pipeline::{run_cron, CronEndpoint, CronRequest};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CronQuery {
    pub limit: Option<u32>,
    pub discover: Option<u32>,
    pub rewrite: Option<u32>,
    #[serde(default)]
    pub cron: Option<u32>,
}

impl CronQuery {
    fn into_request(self, endpoint: CronEndpoint) -> CronRequest {
        CronRequest {
            endpoint,
            limit: self.limit,
            discover: self.discover,
            rewrite: self.rewrite,
        }
    }
}

pub async fn cron_light(State(state): State<AppState>, Query(query): Query<CronQuery>) -> Json<serde_json::Value> {
    run(&state, query.into_request(CronEndpoint::Light)).await
}

pub async fn cron_delta(State(state): State<AppState>, Query(query): Query<CronQuery>) -> Json<serde_json::Value> {
    run(&state, query.into_request(CronEndpoint::Delta)).await
}

pub async fn cron_daily(State(state): State<AppState>, Query(query): Query<CronQuery>) -> Json<serde_json::Value> {
    run(&state, query.into_request(CronEndpoint::Daily)).await
}

async fn run(state: &AppState, request: CronRequest) -> Json<serde_json::Value> {
    let response = run_cron(
        &state.db,
        &state.scheduler,
        &state.pipeline,
        &state.embedding_client,
        &state.chat_client,
        &state.categorizer,
        request,
    )
    .await;

    Json(json!({
        "ok": response.ok,
        "took_ms": response.took_ms,
        "result": response.result,
    }))
}
