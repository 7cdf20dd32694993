//! Error recovery mechanisms: retry-with-backoff and circuit breaking for
//! external services (feed hosts, embedding/chat completion services) and
//! the database pool.

use crate::error::{AppError, Result};
use rand::Rng;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, warn};

/// Configuration for retry policies.
///
/// Default matches the stage-level contract: retry up to 3 times with
/// jittered exponential backoff at 100/400/1200 ms.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(1200),
            backoff_multiplier: 3.0,
        }
    }
}

fn jitter(delay: Duration) -> Duration {
    let factor = rand::thread_rng().gen_range(0.8..1.2);
    Duration::from_millis((delay.as_millis() as f64 * factor) as u64)
}

/// Circuit breaker states
#[derive(Debug, Clone, PartialEq)]
pub enum CircuitBreakerState {
    Closed,
    Open,
    HalfOpen,
}

/// Circuit breaker for external services (embedding/chat endpoints, feed hosts).
#[derive(Debug)]
pub struct CircuitBreaker {
    state: CircuitBreakerState,
    failure_count: u32,
    failure_threshold: u32,
    recovery_timeout: Duration,
    last_failure_time: Option<std::time::Instant>,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, recovery_timeout: Duration) -> Self {
        Self {
            state: CircuitBreakerState::Closed,
            failure_count: 0,
            failure_threshold,
            recovery_timeout,
            last_failure_time: None,
        }
    }

    pub fn can_execute(&mut self) -> bool {
        match self.state {
            CircuitBreakerState::Closed => true,
            CircuitBreakerState::Open => {
                if let Some(last_failure) = self.last_failure_time {
                    if last_failure.elapsed() >= self.recovery_timeout {
                        self.state = CircuitBreakerState::HalfOpen;
                        info!("Circuit breaker transitioning to half-open state");
                        true
                    } else {
                        false
                    }
                } else {
                    false
                }
            }
            CircuitBreakerState::HalfOpen => true,
        }
    }

    pub fn record_success(&mut self) {
        match self.state {
            CircuitBreakerState::HalfOpen => {
                self.state = CircuitBreakerState::Closed;
                self.failure_count = 0;
                self.last_failure_time = None;
                info!("Circuit breaker closed after successful recovery");
            }
            CircuitBreakerState::Closed => {
                self.failure_count = 0;
            }
            _ => {}
        }
    }

    pub fn record_failure(&mut self) {
        self.failure_count += 1;
        self.last_failure_time = Some(std::time::Instant::now());

        match self.state {
            CircuitBreakerState::Closed => {
                if self.failure_count >= self.failure_threshold {
                    self.state = CircuitBreakerState::Open;
                    warn!(
                        failure_count = self.failure_count,
                        threshold = self.failure_threshold,
                        "Circuit breaker opened due to failures"
                    );
                }
            }
            CircuitBreakerState::HalfOpen => {
                self.state = CircuitBreakerState::Open;
                warn!("Circuit breaker reopened after failed recovery attempt");
            }
            _ => {}
        }
    }

    pub fn state(&self) -> &CircuitBreakerState {
        &self.state
    }
}

/// Retry an operation with jittered exponential backoff. Only errors for
/// which `AppError::is_retryable` is true are retried; anything else
/// returns immediately.
pub async fn retry_stage_operation<F, Fut, T>(
    operation: F,
    config: RetryConfig,
    operation_name: &str,
) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut delay = config.initial_delay;
    let mut last_error = None;

    for attempt in 1..=config.max_attempts {
        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    info!(
                        operation = operation_name,
                        attempt = attempt,
                        "operation succeeded after retry"
                    );
                }
                return Ok(result);
            }
            Err(err) => {
                let retryable = err.is_retryable();
                last_error = Some(err);

                if !retryable {
                    break;
                }

                if attempt < config.max_attempts {
                    let wait = jitter(delay);
                    warn!(
                        operation = operation_name,
                        attempt = attempt,
                        max_attempts = config.max_attempts,
                        delay_ms = wait.as_millis(),
                        error = %last_error.as_ref().unwrap(),
                        "operation failed, retrying"
                    );

                    sleep(wait).await;
                    delay = std::cmp::min(
                        Duration::from_millis(
                            (delay.as_millis() as f64 * config.backoff_multiplier) as u64,
                        ),
                        config.max_delay,
                    );
                } else {
                    error!(
                        operation = operation_name,
                        attempt = attempt,
                        error = %last_error.as_ref().unwrap(),
                        "operation failed after all retry attempts"
                    );
                }
            }
        }
    }

    Err(last_error.unwrap_or_else(|| AppError::fatal("retry loop exited without an error")))
}

/// Execute an operation with circuit breaker protection.
pub async fn with_circuit_breaker<F, Fut, T>(
    circuit_breaker: &mut CircuitBreaker,
    operation: F,
    service_name: &str,
) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    if !circuit_breaker.can_execute() {
        warn!(
            service = service_name,
            state = ?circuit_breaker.state(),
            "Circuit breaker is open, rejecting request"
        );
        return Err(AppError::transient(service_name, "circuit breaker open"));
    }

    match operation().await {
        Ok(result) => {
            circuit_breaker.record_success();
            Ok(result)
        }
        Err(err) => {
            circuit_breaker.record_failure();
            Err(err)
        }
    }
}

/// Health check with recovery for database connections.
pub async fn database_health_check_with_recovery(pool: &sqlx::PgPool) -> Result<()> {
    retry_stage_operation(
        || async {
            sqlx::query("SELECT 1")
                .execute(pool)
                .await
                .map_err(|e| AppError::transient("database", e))?;
            Ok(())
        },
        RetryConfig::default(),
        "database_health_check",
    )
    .await
}

/// Graceful degradation helper for optional features.
pub async fn with_graceful_degradation<F, Fut, T>(
    operation: F,
    fallback_value: T,
    feature_name: &str,
) -> T
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    match operation().await {
        Ok(result) => result,
        Err(err) => {
            warn!(
                feature = feature_name,
                error = %err,
                "Feature failed, using fallback value"
            );
            fallback_value
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_retry_success_after_failure() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let config = RetryConfig {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(10),
            backoff_multiplier: 2.0,
        };

        let result = retry_stage_operation(
            || {
                let counter = counter_clone.clone();
                async move {
                    let count = counter.fetch_add(1, Ordering::SeqCst);
                    if count < 2 {
                        Err(AppError::transient("ingest", "connection reset"))
                    } else {
                        Ok("success")
                    }
                }
            },
            config,
            "test_operation",
        )
        .await;

        assert!(result.is_ok());
        assert_eq!(result.unwrap(), "success");
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_errors_are_not_retried() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result: Result<()> = retry_stage_operation(
            || {
                let counter = counter_clone.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(AppError::permanent("ingest", "404 not found"))
                }
            },
            RetryConfig::default(),
            "test_operation",
        )
        .await;

        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_circuit_breaker_states() {
        let mut cb = CircuitBreaker::new(2, Duration::from_millis(100));

        assert_eq!(cb.state(), &CircuitBreakerState::Closed);
        assert!(cb.can_execute());

        cb.record_failure();
        assert_eq!(cb.state(), &CircuitBreakerState::Closed);
        assert!(cb.can_execute());

        cb.record_failure();
        assert_eq!(cb.state(), &CircuitBreakerState::Open);
        assert!(!cb.can_execute());

        std::thread::sleep(Duration::from_millis(101));
        assert!(cb.can_execute());
        assert_eq!(cb.state(), &CircuitBreakerState::HalfOpen);

        cb.record_success();
        assert_eq!(cb.state(), &CircuitBreakerState::Closed);
    }
}
