//! climate-river — a climate-news aggregation pipeline: discovery, ingestion,
//! content prefetch, categorization, clustering, scoring, and headline
//! rewriting, driven by an authenticated Scheduler HTTP surface.

use axum::{
    middleware as axum_middleware,
    routing::get,
    Router,
};
use sqlx::PgPool;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

pub mod config;
pub mod database;
pub mod error;
pub mod handlers;
pub mod health;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod monitoring;
pub mod recovery;
pub mod services;

pub use config::{AppConfig, ConfigError, Environment, PipelineConfig, SchedulerConfig};
pub use database::{Database, DatabasePool};
pub use error::{AppError, ErrorResponse, Result};
pub use monitoring::{MonitoringConfig, MonitoringSystem};
pub use services::news_pipeline::{
    river, Categorizer, ChatClient, CronEndpoint, CronRequest, EmbeddingClient, StageResult,
};

/// Shared application state threaded through every handler via axum's
/// `State` extractor.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub scheduler: Arc<SchedulerConfig>,
    pub pipeline: Arc<PipelineConfig>,
    pub embedding_client: Arc<EmbeddingClient>,
    pub chat_client: Arc<ChatClient>,
    pub categorizer: Arc<Categorizer>,
    pub monitoring: MonitoringSystem,
}

impl AppState {
    pub async fn new(config: &AppConfig, db: PgPool, monitoring: MonitoringSystem) -> anyhow::Result<Self> {
        let embedding_client = Arc::new(EmbeddingClient::new(config.embedding.clone()));
        let chat_client = Arc::new(ChatClient::new(config.chat.clone()));
        let categorizer = Arc::new(Categorizer::load(db.clone(), embedding_client.clone()).await?);

        Ok(Self {
            db,
            scheduler: Arc::new(config.scheduler.clone()),
            pipeline: Arc::new(config.pipeline.clone()),
            embedding_client,
            chat_client,
            categorizer,
            monitoring,
        })
    }
}

/// Assembles the full router: the Scheduler's authenticated cron endpoints
/// plus unauthenticated health/readiness/liveness/metrics surfaces.
pub fn create_router(state: AppState) -> Router {
    let cron_routes = Router::new()
        .route("/light", get(handlers::cron_light).post(handlers::cron_light))
        .route("/delta", get(handlers::cron_delta).post(handlers::cron_delta))
        .route("/daily", get(handlers::cron_daily).post(handlers::cron_daily))
        .layer(axum_middleware::from_fn_with_state(
            state.scheduler.clone(),
            middleware::admin_auth_middleware,
        ));

    let operational_routes = Router::new()
        .route("/health", get(handlers::health_handler))
        .route("/ready", get(handlers::readiness_handler))
        .route("/live", get(handlers::liveness_handler))
        .route("/metrics", get(handlers::metrics_handler));

    let metrics = state.monitoring.metrics();

    Router::new()
        .nest("/cron", cron_routes)
        .merge(operational_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(axum_middleware::from_fn(middleware::tracing_middleware))
                .layer(axum_middleware::from_fn_with_state(
                    metrics,
                    middleware::latency_middleware,
                ))
                .layer(middleware::create_cors_layer()),
        )
        .with_state(state)
}
