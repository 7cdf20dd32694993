//! Scheduler driver: runs a fixed sequence of pipeline stages for a cron
//! endpoint, isolating stage failures from one another and clamping caps
//! server-side regardless of what the request asked for.

use chrono::Timelike;
use serde::Serialize;
use sqlx::PgPool;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::config::{PipelineConfig, SchedulerConfig, StageCaps};
use crate::services::news_pipeline::clustering;
use crate::services::news_pipeline::discovery;
use crate::services::news_pipeline::ingestion;
use crate::services::news_pipeline::prefetch;
use crate::services::news_pipeline::processing::{Categorizer, ChatClient, EmbeddingClient};
use crate::services::news_pipeline::retention;
use crate::services::news_pipeline::rewriter;
use crate::services::news_pipeline::scoring;

/// Outcome of a single pipeline stage. The driver never unwraps this; it
/// aggregates heterogeneous stage outcomes into one response object.
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StageResult {
    Ok {
        stage: &'static str,
        counts: serde_json::Value,
        took_ms: u128,
    },
    Err {
        stage: &'static str,
        error: String,
        partial: Option<serde_json::Value>,
    },
}

impl StageResult {
    fn ok(stage: &'static str, started: Instant, counts: serde_json::Value) -> Self {
        StageResult::Ok {
            stage,
            counts,
            took_ms: started.elapsed().as_millis(),
        }
    }

    fn err(stage: &'static str, error: impl std::fmt::Display) -> Self {
        StageResult::Err {
            stage,
            error: error.to_string(),
            partial: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CronEndpoint {
    Light,
    Delta,
    Daily,
}

impl CronEndpoint {
    fn caps<'a>(&self, scheduler: &'a SchedulerConfig) -> &'a StageCaps {
        match self {
            CronEndpoint::Light => &scheduler.light,
            CronEndpoint::Delta => &scheduler.delta,
            CronEndpoint::Daily => &scheduler.daily,
        }
    }

    fn budget(&self, scheduler: &SchedulerConfig) -> Duration {
        match self {
            CronEndpoint::Light => scheduler.light_budget,
            CronEndpoint::Delta => scheduler.delta_budget,
            CronEndpoint::Daily => scheduler.daily_budget,
        }
    }
}

/// Clamps a requested limit to a stage's configured cap. Requests never get
/// to raise a cap, only to use less of it.
fn clamp(requested: Option<u32>, cap: u32) -> u32 {
    requested.map(|r| r.min(cap)).unwrap_or(cap)
}

pub struct CronRequest {
    pub endpoint: CronEndpoint,
    pub limit: Option<u32>,
    pub discover: Option<u32>,
    pub rewrite: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct CronResponse {
    pub ok: bool,
    pub took_ms: u128,
    pub result: BTreeMap<&'static str, StageResult>,
}

fn stage_name(result: &StageResult) -> &'static str {
    match result {
        StageResult::Ok { stage, .. } => stage,
        StageResult::Err { stage, .. } => stage,
    }
}

fn insert(results: &mut BTreeMap<&'static str, StageResult>, result: StageResult) {
    results.insert(stage_name(&result), result);
}

/// Runs the stage sequence for `request.endpoint`, honoring the current UTC
/// hour gate for the optional web-discover sub-stage on `light`/`daily`.
pub async fn run_cron(
    pool: &PgPool,
    scheduler: &SchedulerConfig,
    pipeline: &PipelineConfig,
    embedding_client: &EmbeddingClient,
    chat_client: &ChatClient,
    categorizer: &Categorizer,
    request: CronRequest,
) -> CronResponse {
    let correlation_id = Uuid::new_v4();
    let started = Instant::now();
    let caps = request.endpoint.caps(scheduler);
    let budget = request.endpoint.budget(scheduler);
    let now_hour = chrono::Utc::now().hour();

    tracing::info!(%correlation_id, endpoint = ?request.endpoint, "cron invocation started");

    let mut results = BTreeMap::new();
    let deadline = started + budget;

    match request.endpoint {
        CronEndpoint::Light => {
            insert(&mut results, stage_ingest(pool, clamp(request.limit, caps.ingest)).await);
            if Instant::now() < deadline {
                insert(&mut results, stage_categorize(categorizer, clamp(request.limit, caps.ingest)).await);
            }
            if Instant::now() < deadline {
                insert(&mut results, stage_cluster(pool, embedding_client, clamp(request.limit, caps.ingest)).await);
            }
            if Instant::now() < deadline {
                insert(&mut results, stage_prefetch(pool, clamp(request.limit, caps.prefetch)).await);
            }
            if Instant::now() < deadline {
                insert(&mut results, stage_score(pool).await);
            }
            if Instant::now() < deadline && in_hour_window(now_hour, scheduler.light_discover_hours) {
                insert(
                    &mut results,
                    stage_web_discover(pool, chat_client, clamp(request.discover, 5), 3, true).await,
                );
            }
        }
        CronEndpoint::Delta => {
            insert(&mut results, stage_discover(pool, clamp(request.discover, caps.discover)).await);
            if Instant::now() < deadline {
                insert(&mut results, stage_ingest(pool, clamp(request.limit, caps.ingest)).await);
            }
            if Instant::now() < deadline {
                insert(&mut results, stage_categorize(categorizer, clamp(request.limit, caps.ingest)).await);
            }
            if Instant::now() < deadline {
                insert(&mut results, stage_cluster(pool, embedding_client, clamp(request.limit, caps.ingest)).await);
            }
            if Instant::now() < deadline {
                insert(&mut results, stage_score(pool).await);
            }
            if Instant::now() < deadline {
                insert(
                    &mut results,
                    stage_rewrite(pool, chat_client, clamp(request.rewrite, caps.rewrite)).await,
                );
            }
        }
        CronEndpoint::Daily => {
            insert(&mut results, stage_discover(pool, clamp(request.discover, caps.discover)).await);
            if Instant::now() < deadline {
                insert(&mut results, stage_ingest(pool, clamp(request.limit, caps.ingest)).await);
            }
            if Instant::now() < deadline {
                insert(&mut results, stage_categorize(categorizer, clamp(request.limit, caps.ingest)).await);
            }
            if Instant::now() < deadline {
                insert(&mut results, stage_cluster(pool, embedding_client, clamp(request.limit, caps.ingest)).await);
            }
            if Instant::now() < deadline {
                insert(&mut results, stage_prefetch(pool, clamp(request.limit, caps.prefetch)).await);
            }
            if Instant::now() < deadline {
                insert(&mut results, stage_score(pool).await);
            }
            if Instant::now() < deadline {
                insert(
                    &mut results,
                    stage_rewrite(pool, chat_client, clamp(request.rewrite, caps.rewrite)).await,
                );
            }
            if Instant::now() < deadline && in_hour_window(now_hour, scheduler.daily_discover_hours) {
                insert(
                    &mut results,
                    stage_web_discover(pool, chat_client, clamp(request.discover, 6), 4, false).await,
                );
            }
            if Instant::now() < deadline {
                insert(&mut results, stage_maintenance(pool).await);
            }
            if Instant::now() < deadline {
                insert(&mut results, stage_retention(pool, pipeline.retention_days).await);
            }
            if Instant::now() < deadline {
                insert(
                    &mut results,
                    stage_backfill(pool, pipeline.backfill_hours, pipeline.backfill_batch).await,
                );
            }
        }
    }

    let ok = results.values().all(|r| matches!(r, StageResult::Ok { .. }));
    tracing::info!(%correlation_id, ok, took_ms = started.elapsed().as_millis(), "cron invocation finished");

    CronResponse {
        ok,
        took_ms: started.elapsed().as_millis(),
        result: results,
    }
}

fn in_hour_window(hour: u32, window: (u32, u32)) -> bool {
    let (start, end) = window;
    hour >= start && hour <= end
}

/// Folds the clamped limit actually used for a stage into its `counts`
/// object, so a caller can confirm server-side clamping without needing
/// access to the scheduler's configured caps.
fn counts_with_limit(result: impl Serialize, limit: u32) -> serde_json::Value {
    let mut counts = serde_json::json!(result);
    if let serde_json::Value::Object(map) = &mut counts {
        map.insert("limit".to_string(), serde_json::json!(limit));
    }
    counts
}

async fn stage_discover(pool: &PgPool, limit: u32) -> StageResult {
    let started = Instant::now();
    match discovery::discover_feeds(pool, limit).await {
        Ok(result) => StageResult::ok("discover", started, counts_with_limit(result, limit)),
        Err(error) => StageResult::err("discover", error),
    }
}

async fn stage_web_discover(
    pool: &PgPool,
    chat_client: &ChatClient,
    max_queries: u32,
    per_query: u32,
    breaking: bool,
) -> StageResult {
    let started = Instant::now();
    match discovery::discover_web(pool, chat_client, max_queries, per_query, breaking).await {
        Ok(result) => StageResult::ok("web_discover", started, counts_with_limit(result, max_queries)),
        Err(error) => StageResult::err("web_discover", error),
    }
}

const INGEST_CONCURRENCY: usize = 8;
const PREFETCH_CONCURRENCY: usize = 3;

async fn stage_ingest(pool: &PgPool, limit: u32) -> StageResult {
    let started = Instant::now();
    match ingestion::ingest(pool, limit, INGEST_CONCURRENCY).await {
        Ok(result) => StageResult::ok("ingest", started, counts_with_limit(result, limit)),
        Err(error) => StageResult::err("ingest", error),
    }
}

async fn stage_prefetch(pool: &PgPool, limit: u32) -> StageResult {
    let started = Instant::now();
    let ids = match prefetch::select_pending(pool, limit).await {
        Ok(ids) => ids,
        Err(error) => return StageResult::err("prefetch", error),
    };
    match prefetch::prefetch(pool, &ids, PREFETCH_CONCURRENCY).await {
        Ok(result) => StageResult::ok("prefetch", started, counts_with_limit(result, limit)),
        Err(error) => StageResult::err("prefetch", error),
    }
}

async fn stage_categorize(categorizer: &Categorizer, limit: u32) -> StageResult {
    let started = Instant::now();
    match categorizer.categorize_new(limit).await {
        Ok(result) => StageResult::ok("categorize", started, counts_with_limit(result, limit)),
        Err(error) => StageResult::err("categorize", error),
    }
}

async fn stage_score(pool: &PgPool) -> StageResult {
    let started = Instant::now();
    match scoring::score_clusters(pool).await {
        Ok(result) => StageResult::ok("score", started, serde_json::json!(result)),
        Err(error) => StageResult::err("score", error),
    }
}

async fn stage_rewrite(pool: &PgPool, chat_client: &ChatClient, limit: u32) -> StageResult {
    let started = Instant::now();
    match rewriter::rewrite(pool, chat_client, limit).await {
        Ok(result) => StageResult::ok("rewrite", started, counts_with_limit(result, limit)),
        Err(error) => StageResult::err("rewrite", error),
    }
}

/// Embeds newly-ingested articles and assigns them to clusters. Always runs
/// immediately after `ingest` within an invocation; not itself a cron stage
/// with its own cap or endpoint gating.
async fn stage_cluster(pool: &PgPool, embedding_client: &EmbeddingClient, limit: u32) -> StageResult {
    let started = Instant::now();
    match clustering::cluster_new_articles(pool, embedding_client, limit).await {
        Ok(result) => StageResult::ok("cluster", started, counts_with_limit(result, limit)),
        Err(error) => StageResult::err("cluster", error),
    }
}

/// Retroactive join/merge and orphan cleanup across all existing clusters,
/// not just the ones touched by this invocation's `cluster` stage. Runs once
/// a day; cheap enough not to need its own cap.
async fn stage_maintenance(pool: &PgPool) -> StageResult {
    let started = Instant::now();
    match clustering::run_maintenance(pool).await {
        Ok(result) => StageResult::ok("maintenance", started, serde_json::json!(result)),
        Err(error) => StageResult::err("maintenance", error),
    }
}

async fn stage_retention(pool: &PgPool, retention_days: i64) -> StageResult {
    let started = Instant::now();
    match retention::cleanup(pool, retention_days).await {
        Ok(result) => StageResult::ok("retention", started, serde_json::json!(result)),
        Err(error) => StageResult::err("retention", error),
    }
}

async fn stage_backfill(pool: &PgPool, older_than_hours: i64, batch: u32) -> StageResult {
    let started = Instant::now();
    match ingestion::backfill(pool, older_than_hours, batch, INGEST_CONCURRENCY).await {
        Ok(result) => StageResult::ok("backfill", started, counts_with_limit(result, batch)),
        Err(error) => StageResult::err("backfill", error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_never_exceeds_cap() {
        assert_eq!(clamp(Some(500), 50), 50);
        assert_eq!(clamp(Some(10), 50), 10);
        assert_eq!(clamp(None, 50), 50);
    }

    #[test]
    fn hour_window_is_inclusive() {
        assert!(in_hour_window(9, (9, 21)));
        assert!(in_hour_window(21, (9, 21)));
        assert!(!in_hour_window(8, (9, 21)));
        assert!(!in_hour_window(22, (9, 21)));
    }

    #[test]
    fn counts_with_limit_folds_in_the_clamped_value() {
        let counts = counts_with_limit(serde_json::json!({"fetched": 3}), 50);
        assert_eq!(counts["limit"], 50);
        assert_eq!(counts["fetched"], 3);
    }

    #[test]
    fn response_result_is_keyed_by_stage_name() {
        let mut results = BTreeMap::new();
        insert(&mut results, StageResult::ok("ingest", Instant::now(), serde_json::json!({})));
        insert(&mut results, StageResult::err("rewrite", "boom"));
        assert!(results.contains_key("ingest"));
        assert!(results.contains_key("rewrite"));
    }
}
