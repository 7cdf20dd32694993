//! Health and readiness checks backed by the database pool.

use crate::error::Result;
use crate::recovery::database_health_check_with_recovery;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthCheckResponse {
    pub status: HealthStatus,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub correlation_id: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub services: HashMap<String, ServiceHealthInfo>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ServiceHealthInfo {
    pub status: HealthStatus,
    pub response_time_ms: u64,
    pub last_check: chrono::DateTime<chrono::Utc>,
    pub error_message: Option<String>,
    pub details: Option<serde_json::Value>,
}

#[derive(Debug, Clone)]
pub struct HealthCheckConfig {
    pub timeout: Duration,
    pub detailed_checks: bool,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            detailed_checks: true,
        }
    }
}

pub struct HealthChecker {
    config: HealthCheckConfig,
    start_time: Instant,
}

impl HealthChecker {
    pub fn new(config: HealthCheckConfig) -> Self {
        Self {
            config,
            start_time: Instant::now(),
        }
    }

    pub async fn check_health(&self, db_pool: &sqlx::PgPool) -> HealthCheckResponse {
        let correlation_id = Uuid::new_v4().to_string();
        let mut services = HashMap::new();

        services.insert("database".to_string(), self.check_database_health(db_pool).await);

        let overall_status = self.determine_overall_status(&services);

        HealthCheckResponse {
            status: overall_status,
            timestamp: chrono::Utc::now(),
            correlation_id,
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: self.start_time.elapsed().as_secs(),
            services,
        }
    }

    async fn check_database_health(&self, db_pool: &sqlx::PgPool) -> ServiceHealthInfo {
        let start = Instant::now();
        let last_check = chrono::Utc::now();

        match database_health_check_with_recovery(db_pool).await {
            Ok(()) => {
                let response_time = start.elapsed().as_millis() as u64;
                let details = if self.config.detailed_checks {
                    self.get_database_details(db_pool).await
                } else {
                    None
                };

                ServiceHealthInfo {
                    status: HealthStatus::Healthy,
                    response_time_ms: response_time,
                    last_check,
                    error_message: None,
                    details,
                }
            }
            Err(err) => {
                let response_time = start.elapsed().as_millis() as u64;
                tracing::error!(
                    correlation_id = %Uuid::new_v4(),
                    error = %err,
                    response_time_ms = response_time,
                    "Database health check failed"
                );

                ServiceHealthInfo {
                    status: HealthStatus::Unhealthy,
                    response_time_ms: response_time,
                    last_check,
                    error_message: Some(err.to_string()),
                    details: Some(serde_json::json!({
                        "connection_pool_status": "failed",
                        "retry_attempts": "exhausted"
                    })),
                }
            }
        }
    }

    async fn get_database_details(&self, db_pool: &sqlx::PgPool) -> Option<serde_json::Value> {
        let stats_result = sqlx::query!(
            r#"
            SELECT
                (SELECT count(*) FROM articles) as "article_count!",
                (SELECT count(*) FROM clusters) as "cluster_count!",
                (SELECT count(*) FROM sources) as "source_count!"
            "#
        )
        .fetch_optional(db_pool)
        .await;

        match stats_result {
            Ok(Some(stats)) => Some(serde_json::json!({
                "connection_pool_size": db_pool.size(),
                "idle_connections": db_pool.num_idle(),
                "article_count": stats.article_count,
                "cluster_count": stats.cluster_count,
                "source_count": stats.source_count,
            })),
            _ => Some(serde_json::json!({
                "connection_pool_size": db_pool.size(),
                "idle_connections": db_pool.num_idle(),
                "statistics": "unavailable"
            })),
        }
    }

    fn determine_overall_status(
        &self,
        services: &HashMap<String, ServiceHealthInfo>,
    ) -> HealthStatus {
        let mut degraded_count = 0;
        let mut unhealthy_count = 0;

        for service in services.values() {
            match service.status {
                HealthStatus::Healthy => {}
                HealthStatus::Degraded => degraded_count += 1,
                HealthStatus::Unhealthy => unhealthy_count += 1,
            }
        }

        if unhealthy_count > 0 {
            HealthStatus::Unhealthy
        } else if degraded_count > 0 {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        }
    }
}

/// Readiness check: the database must be reachable.
pub async fn readiness_check(db_pool: &sqlx::PgPool) -> Result<()> {
    database_health_check_with_recovery(db_pool).await
}

/// Liveness check: the process is alive if it can respond at all.
pub async fn liveness_check() -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_determine_overall_status() {
        let checker = HealthChecker::new(HealthCheckConfig::default());
        let mut services = HashMap::new();

        services.insert(
            "database".to_string(),
            ServiceHealthInfo {
                status: HealthStatus::Healthy,
                response_time_ms: 10,
                last_check: chrono::Utc::now(),
                error_message: None,
                details: None,
            },
        );
        assert_eq!(
            checker.determine_overall_status(&services),
            HealthStatus::Healthy
        );

        services.insert(
            "database".to_string(),
            ServiceHealthInfo {
                status: HealthStatus::Unhealthy,
                response_time_ms: 5000,
                last_check: chrono::Utc::now(),
                error_message: Some("Connection failed".to_string()),
                details: None,
            },
        );
        assert_eq!(
            checker.determine_overall_status(&services),
            HealthStatus::Unhealthy
        );
    }
}
