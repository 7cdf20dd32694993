//! Combined health + metrics monitoring system, and the correlation-ID
//! plumbing used by request tracing middleware.

use crate::error::{AppError, Result};
use crate::health::{HealthCheckConfig, HealthCheckResponse, HealthChecker, HealthStatus};
use crate::metrics::{DatabaseMetrics, MetricsCollector};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::interval;
use tracing::{error, info, warn};
use uuid::Uuid;

/// A per-request correlation ID, generated or propagated from an inbound
/// `x-correlation-id` header.
#[derive(Debug, Clone)]
pub struct CorrelationId(pub String);

impl CorrelationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_header(value: Option<&str>) -> Self {
        match value {
            Some(v) if !v.is_empty() => Self(v.to_string()),
            _ => Self::new(),
        }
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single structured log line recorded alongside a request span.
#[derive(Debug, Serialize, Deserialize)]
pub struct StructuredLogEntry {
    pub correlation_id: String,
    pub method: String,
    pub uri: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl StructuredLogEntry {
    pub fn new(correlation_id: &CorrelationId, method: &str, uri: &str) -> Self {
        Self {
            correlation_id: correlation_id.0.clone(),
            method: method.to_string(),
            uri: uri.to_string(),
            timestamp: chrono::Utc::now(),
        }
    }
}

/// Comprehensive monitoring system combining health checks and metrics.
#[derive(Clone)]
pub struct MonitoringSystem {
    metrics: Arc<MetricsCollector>,
    health_checker: Arc<HealthChecker>,
    db_metrics: Arc<DatabaseMetrics>,
}

#[derive(Debug, Clone)]
pub struct MonitoringConfig {
    pub health_check_interval: Duration,
    pub metrics_update_interval: Duration,
    pub detailed_health_checks: bool,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            health_check_interval: Duration::from_secs(30),
            metrics_update_interval: Duration::from_secs(10),
            detailed_health_checks: true,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MonitoringResponse {
    pub health: HealthCheckResponse,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl MonitoringSystem {
    pub fn new(config: MonitoringConfig) -> Result<Self> {
        let metrics = Arc::new(MetricsCollector::new().map_err(|e| {
            AppError::fatal(format!("Failed to create metrics collector: {e}"))
        })?);

        let health_config = HealthCheckConfig {
            timeout: Duration::from_secs(5),
            detailed_checks: config.detailed_health_checks,
        };

        Ok(Self {
            health_checker: Arc::new(HealthChecker::new(health_config)),
            db_metrics: Arc::new(DatabaseMetrics::new(metrics.clone())),
            metrics,
        })
    }

    pub fn metrics(&self) -> Arc<MetricsCollector> {
        self.metrics.clone()
    }

    pub fn db_metrics(&self) -> Arc<DatabaseMetrics> {
        self.db_metrics.clone()
    }

    pub async fn comprehensive_check(&self, db_pool: &sqlx::PgPool) -> MonitoringResponse {
        let health = self.health_checker.check_health(db_pool).await;
        self.db_metrics.update_pool_metrics(db_pool);

        MonitoringResponse {
            health,
            timestamp: chrono::Utc::now(),
        }
    }

    /// Start the periodic health-check / pool-metrics background task.
    pub fn start_background_monitoring(&self, config: MonitoringConfig, db_pool: sqlx::PgPool) {
        let monitoring = self.clone();

        tokio::spawn(async move {
            let mut health_interval = interval(config.health_check_interval);
            let mut metrics_interval = interval(config.metrics_update_interval);

            loop {
                tokio::select! {
                    _ = health_interval.tick() => {
                        let health = monitoring.health_checker.check_health(&db_pool).await;
                        match health.status {
                            HealthStatus::Healthy => info!("health check passed"),
                            HealthStatus::Degraded => warn!("health check degraded"),
                            HealthStatus::Unhealthy => error!("health check failed"),
                        }
                    }
                    _ = metrics_interval.tick() => {
                        monitoring.db_metrics.update_pool_metrics(&db_pool);
                    }
                }
            }
        });
    }
}

/// Alert thresholds evaluated against `MonitoringResponse`.
#[derive(Debug, Clone)]
pub struct AlertThresholds {
    pub min_idle_connections: u32,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            min_idle_connections: 2,
        }
    }
}

pub struct AlertManager {
    thresholds: AlertThresholds,
}

impl AlertManager {
    pub fn new(thresholds: AlertThresholds) -> Self {
        Self { thresholds }
    }

    pub fn check_alerts(&self, db_pool: &sqlx::PgPool) -> Vec<Alert> {
        let mut alerts = Vec::new();
        let idle = db_pool.num_idle() as u32;

        if idle < self.thresholds.min_idle_connections {
            alerts.push(Alert {
                severity: AlertSeverity::Critical,
                message: format!(
                    "Low idle database connections: {idle} (threshold: {})",
                    self.thresholds.min_idle_connections
                ),
                metric: "db_idle_connections".to_string(),
                value: idle as f64,
                threshold: self.thresholds.min_idle_connections as f64,
            });
        }

        alerts
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AlertSeverity {
    Info,
    Warning,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub severity: AlertSeverity,
    pub message: String,
    pub metric: String,
    pub value: f64,
    pub threshold: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monitoring_system_creation() {
        let config = MonitoringConfig::default();
        let monitoring = MonitoringSystem::new(config).expect("Failed to create monitoring system");
        let metrics_text = monitoring.metrics().get_metrics().expect("Failed to get metrics");
        assert!(!metrics_text.is_empty());
    }

    #[test]
    fn test_correlation_id_from_header() {
        let from_header = CorrelationId::from_header(Some("abc-123"));
        assert_eq!(from_header.0, "abc-123");

        let generated = CorrelationId::from_header(None);
        assert!(!generated.0.is_empty());
    }
}
