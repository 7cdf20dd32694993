//! Prometheus metrics collection and monitoring
//!
//! Provides HTTP request metrics, database pool/operation metrics, and
//! per-stage pipeline metrics. All values are collected from actual request
//! and stage executions, never placeholders.

use axum::{
    body::Body,
    extract::State,
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
};
use prometheus::{CounterVec, Gauge, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder};
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;

/// Metrics collector with Prometheus integration
#[derive(Clone)]
pub struct MetricsCollector {
    registry: Arc<Registry>,

    // HTTP metrics
    http_requests_total: CounterVec,
    http_request_duration: HistogramVec,
    http_requests_in_flight: Gauge,
    http_request_latency: HistogramVec,

    // Database metrics
    db_connections_active: Gauge,
    db_connections_idle: Gauge,
    db_query_duration: HistogramVec,
    db_operations_total: CounterVec,

    // Pipeline stage metrics
    pipeline_stage_runs_total: CounterVec,
    pipeline_stage_errors_total: CounterVec,
    pipeline_stage_duration_seconds: HistogramVec,
}

impl MetricsCollector {
    /// Create a new metrics collector with all metrics registered
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Arc::new(Registry::new());

        let http_requests_total = CounterVec::new(
            Opts::new("http_requests_total", "Total number of HTTP requests")
                .namespace("climate_river")
                .subsystem("http"),
            &["method", "endpoint", "status_code"],
        )?;

        let http_request_duration = HistogramVec::new(
            HistogramOpts::new(
                "http_request_duration_seconds",
                "HTTP request duration in seconds",
            )
            .namespace("climate_river")
            .subsystem("http")
            .buckets(vec![
                0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
            ]),
            &["method", "endpoint"],
        )?;

        let http_requests_in_flight = Gauge::new(
            "climate_river_http_requests_in_flight",
            "Number of HTTP requests currently being processed",
        )?;

        // Latency histogram for P50/P90/P99: 10ms, 50ms, 100ms, 250ms, 500ms, 1000ms, 5000ms
        let http_request_latency = HistogramVec::new(
            HistogramOpts::new(
                "http_request_latency_seconds",
                "HTTP request latency in seconds for percentile calculations",
            )
            .namespace("climate_river")
            .subsystem("http")
            .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 5.0]),
            &["method", "path", "status_code"],
        )?;

        let db_connections_active = Gauge::new(
            "climate_river_db_connections_active",
            "Number of active database connections",
        )?;

        let db_connections_idle = Gauge::new(
            "climate_river_db_connections_idle",
            "Number of idle database connections",
        )?;

        let db_query_duration = HistogramVec::new(
            HistogramOpts::new(
                "db_query_duration_seconds",
                "Database query duration in seconds",
            )
            .namespace("climate_river")
            .subsystem("db")
            .buckets(vec![
                0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0,
            ]),
            &["operation", "table"],
        )?;

        let db_operations_total = CounterVec::new(
            Opts::new("db_operations_total", "Total number of database operations")
                .namespace("climate_river")
                .subsystem("db"),
            &["operation", "table", "status"],
        )?;

        let pipeline_stage_runs_total = CounterVec::new(
            Opts::new(
                "pipeline_stage_runs_total",
                "Total number of pipeline stage invocations",
            )
            .namespace("climate_river")
            .subsystem("pipeline"),
            &["stage"],
        )?;

        let pipeline_stage_errors_total = CounterVec::new(
            Opts::new(
                "pipeline_stage_errors_total",
                "Total number of pipeline stage failures",
            )
            .namespace("climate_river")
            .subsystem("pipeline"),
            &["stage"],
        )?;

        let pipeline_stage_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "pipeline_stage_duration_seconds",
                "Pipeline stage run duration in seconds",
            )
            .namespace("climate_river")
            .subsystem("pipeline")
            .buckets(vec![0.1, 0.5, 1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0]),
            &["stage"],
        )?;

        registry.register(Box::new(http_requests_total.clone()))?;
        registry.register(Box::new(http_request_duration.clone()))?;
        registry.register(Box::new(http_requests_in_flight.clone()))?;
        registry.register(Box::new(http_request_latency.clone()))?;
        registry.register(Box::new(db_connections_active.clone()))?;
        registry.register(Box::new(db_connections_idle.clone()))?;
        registry.register(Box::new(db_query_duration.clone()))?;
        registry.register(Box::new(db_operations_total.clone()))?;
        registry.register(Box::new(pipeline_stage_runs_total.clone()))?;
        registry.register(Box::new(pipeline_stage_errors_total.clone()))?;
        registry.register(Box::new(pipeline_stage_duration_seconds.clone()))?;

        Ok(Self {
            registry,
            http_requests_total,
            http_request_duration,
            http_requests_in_flight,
            http_request_latency,
            db_connections_active,
            db_connections_idle,
            db_query_duration,
            db_operations_total,
            pipeline_stage_runs_total,
            pipeline_stage_errors_total,
            pipeline_stage_duration_seconds,
        })
    }

    /// Record HTTP request metrics
    pub fn record_http_request(
        &self,
        method: &Method,
        endpoint: &str,
        status_code: StatusCode,
        duration: std::time::Duration,
    ) {
        let status_str = status_code.as_u16().to_string();

        self.http_requests_total
            .with_label_values(&[method.as_str(), endpoint, &status_str])
            .inc();

        self.http_request_duration
            .with_label_values(&[method.as_str(), endpoint])
            .observe(duration.as_secs_f64());
    }

    /// Record request latency for percentile calculations.
    ///
    /// Labels: method, path, status_code.
    pub fn record_request_latency(
        &self,
        method: &str,
        path: &str,
        status_code: u16,
        duration: std::time::Duration,
    ) {
        self.http_request_latency
            .with_label_values(&[method, path, &status_code.to_string()])
            .observe(duration.as_secs_f64());
    }

    pub fn increment_in_flight_requests(&self) {
        self.http_requests_in_flight.inc();
    }

    pub fn decrement_in_flight_requests(&self) {
        self.http_requests_in_flight.dec();
    }

    /// Update database connection pool gauges
    pub fn update_db_connections(&self, active: u32, idle: u32) {
        self.db_connections_active.set(active as f64);
        self.db_connections_idle.set(idle as f64);
    }

    /// Record database operation metrics
    pub fn record_db_operation(
        &self,
        operation: &str,
        table: &str,
        duration: std::time::Duration,
        success: bool,
    ) {
        let status = if success { "success" } else { "error" };

        self.db_operations_total
            .with_label_values(&[operation, table, status])
            .inc();

        self.db_query_duration
            .with_label_values(&[operation, table])
            .observe(duration.as_secs_f64());
    }

    /// Record one pipeline stage run: increments the run counter, the error
    /// counter when `ok` is false, and observes the stage duration.
    pub fn record_stage_run(&self, stage: &str, ok: bool, duration: std::time::Duration) {
        self.pipeline_stage_runs_total
            .with_label_values(&[stage])
            .inc();
        if !ok {
            self.pipeline_stage_errors_total
                .with_label_values(&[stage])
                .inc();
        }
        self.pipeline_stage_duration_seconds
            .with_label_values(&[stage])
            .observe(duration.as_secs_f64());
    }

    /// Get metrics in Prometheus text exposition format
    pub fn get_metrics(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).to_string())
    }

    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }
}

/// HTTP request timer for measuring request duration
pub struct RequestTimer {
    start: Instant,
    metrics: Arc<MetricsCollector>,
    method: Method,
    endpoint: String,
}

impl RequestTimer {
    pub fn new(metrics: Arc<MetricsCollector>, method: Method, endpoint: String) -> Self {
        metrics.increment_in_flight_requests();
        Self {
            start: Instant::now(),
            metrics,
            method,
            endpoint,
        }
    }

    pub fn finish(self, status_code: StatusCode) {
        let duration = self.start.elapsed();
        self.metrics.decrement_in_flight_requests();
        self.metrics
            .record_http_request(&self.method, &self.endpoint, status_code, duration);
    }
}

/// Metrics endpoint handler
pub async fn metrics_handler(State(metrics): State<Arc<MetricsCollector>>) -> impl IntoResponse {
    match metrics.get_metrics() {
        Ok(metrics_text) => Response::builder()
            .status(StatusCode::OK)
            .header("content-type", "text/plain; version=0.0.4; charset=utf-8")
            .body(Body::from(metrics_text))
            .unwrap(),
        Err(err) => {
            tracing::error!("Failed to generate metrics: {}", err);
            Response::builder()
                .status(StatusCode::INTERNAL_SERVER_ERROR)
                .header("content-type", "application/json")
                .body(Body::from(
                    json!({
                        "error": "Failed to generate metrics",
                        "details": err.to_string()
                    })
                    .to_string(),
                ))
                .unwrap()
        }
    }
}

/// Timing helper for database operations, recording duration + success/table labels
pub struct DatabaseMetrics {
    metrics: Arc<MetricsCollector>,
}

impl DatabaseMetrics {
    pub fn new(metrics: Arc<MetricsCollector>) -> Self {
        Self { metrics }
    }

    pub async fn time_operation<F, T, E>(
        &self,
        operation: &str,
        table: &str,
        future: F,
    ) -> Result<T, E>
    where
        F: std::future::Future<Output = Result<T, E>>,
    {
        let start = Instant::now();
        let result = future.await;
        let duration = start.elapsed();
        let success = result.is_ok();

        self.metrics
            .record_db_operation(operation, table, duration, success);
        result
    }

    pub fn update_pool_metrics(&self, pool: &sqlx::PgPool) {
        let active = (pool.size() as usize).saturating_sub(pool.num_idle()) as u32;
        let idle = pool.num_idle() as u32;
        self.metrics.update_db_connections(active, idle);
    }
}

/// Timing helper for a single pipeline stage run.
pub struct StageTimer {
    start: Instant,
    metrics: Arc<MetricsCollector>,
    stage: &'static str,
}

impl StageTimer {
    pub fn start(metrics: Arc<MetricsCollector>, stage: &'static str) -> Self {
        Self {
            start: Instant::now(),
            metrics,
            stage,
        }
    }

    pub fn finish(self, ok: bool) {
        self.metrics.record_stage_run(self.stage, ok, self.start.elapsed());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Method;

    #[test]
    fn test_metrics_collector_creation() {
        let metrics = MetricsCollector::new().expect("Failed to create metrics collector");
        let metrics_text = metrics.get_metrics().expect("Failed to get metrics");
        assert!(!metrics_text.is_empty());
    }

    #[test]
    fn test_http_metrics_recording() {
        let metrics = MetricsCollector::new().expect("Failed to create metrics collector");

        metrics.record_http_request(
            &Method::GET,
            "/healthz",
            StatusCode::OK,
            std::time::Duration::from_millis(100),
        );
        metrics.record_http_request(
            &Method::POST,
            "/cron/light",
            StatusCode::UNAUTHORIZED,
            std::time::Duration::from_millis(50),
        );

        let metrics_text = metrics.get_metrics().expect("Failed to get metrics");
        assert!(metrics_text.contains("climate_river_http_http_requests_total"));
        assert!(metrics_text.contains("climate_river_http_http_request_duration_seconds"));
    }

    #[test]
    fn test_stage_metrics_recording() {
        let metrics = MetricsCollector::new().expect("Failed to create metrics collector");

        metrics.record_stage_run("discover", true, std::time::Duration::from_millis(800));
        metrics.record_stage_run("cluster", false, std::time::Duration::from_millis(1200));

        let metrics_text = metrics.get_metrics().expect("Failed to get metrics");
        assert!(metrics_text.contains("climate_river_pipeline_pipeline_stage_runs_total"));
        assert!(metrics_text.contains("climate_river_pipeline_pipeline_stage_errors_total"));
        assert!(metrics_text.contains("stage=\"discover\""));
        assert!(metrics_text.contains("stage=\"cluster\""));
    }

    #[test]
    fn test_request_latency_recording() {
        let metrics = MetricsCollector::new().expect("Failed to create metrics collector");

        metrics.record_request_latency("GET", "/healthz", 200, std::time::Duration::from_millis(5));
        metrics.record_request_latency(
            "POST",
            "/cron/delta",
            200,
            std::time::Duration::from_millis(2500),
        );

        let metrics_text = metrics.get_metrics().expect("Failed to get metrics");
        assert!(metrics_text.contains("climate_river_http_http_request_latency_seconds"));
        assert!(metrics_text.contains("le=\"0.01\""));
        assert!(metrics_text.contains("le=\"5\""));
    }
}
