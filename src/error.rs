//! Application error taxonomy.
//!
//! Errors are categorized by how the Scheduler and pipeline stages should
//! react to them, not by which crate produced them: transient I/O is
//! retried, permanent item failures are recorded and skipped, integrity
//! violations are resolved by upsert where possible, and fatal errors abort
//! a stage and surface as a 5xx response.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

/// Error response structure for consistent API responses.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_code: String,
    pub message: String,
    pub details: Option<serde_json::Value>,
    pub correlation_id: String,
    pub timestamp: String,
}

/// Application-wide error type.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Network timeout, 5xx response, rate limit — retryable within a stage.
    #[error("transient failure in stage {stage}: {source}")]
    Transient { stage: String, source: String },

    /// 4xx (excluding paywall/blocked signals), malformed feed item, non-text
    /// content — recorded against the item, not retried.
    #[error("permanent failure in stage {stage}: {reason}")]
    Permanent { stage: String, reason: String },

    /// Database constraint violation that is not resolved by the caller's
    /// upsert (i.e. not the expected `canonical_url` race).
    #[error("integrity violation: {0}")]
    Integrity(#[from] sqlx::Error),

    /// DB pool exhausted, schema missing, auth misconfigured — aborts the
    /// stage/request and surfaces as a 500.
    #[error("fatal error: {reason}")]
    Fatal { reason: String },

    #[error("resource not found: {0}")]
    NotFound(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("configuration error: {0}")]
    Config(String),
}

impl AppError {
    pub fn transient(stage: impl Into<String>, source: impl std::fmt::Display) -> Self {
        Self::Transient {
            stage: stage.into(),
            source: source.to_string(),
        }
    }

    pub fn permanent(stage: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Permanent {
            stage: stage.into(),
            reason: reason.into(),
        }
    }

    pub fn fatal(reason: impl Into<String>) -> Self {
        Self::Fatal {
            reason: reason.into(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Permanent { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Transient { .. } => StatusCode::BAD_GATEWAY,
            AppError::Integrity(_) | AppError::Fatal { .. } | AppError::Config(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Transient { .. } => "TRANSIENT_FAILURE",
            AppError::Permanent { .. } => "PERMANENT_FAILURE",
            AppError::Integrity(_) => "INTEGRITY_VIOLATION",
            AppError::Fatal { .. } => "FATAL_ERROR",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Unauthorized => "UNAUTHORIZED",
            AppError::Config(_) => "CONFIGURATION_ERROR",
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            AppError::Transient { stage, .. } => {
                format!("{stage} is temporarily unavailable, will retry")
            }
            AppError::Permanent { stage, reason } => format!("{stage} failed: {reason}"),
            AppError::Integrity(_) => "A data integrity error occurred".to_string(),
            AppError::Fatal { .. } => "An internal error occurred".to_string(),
            AppError::NotFound(resource) => format!("{resource} not found"),
            AppError::Unauthorized => "Authentication required".to_string(),
            AppError::Config(_) => "Service misconfigured".to_string(),
        }
    }

    pub fn error_details(&self) -> Option<serde_json::Value> {
        match self {
            AppError::Transient { stage, source } => Some(json!({ "stage": stage, "source": source })),
            AppError::Permanent { stage, reason } => Some(json!({ "stage": stage, "reason": reason })),
            _ => None,
        }
    }

    /// Whether a stage runner should retry the operation that produced this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::Transient { .. })
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let correlation_id = Uuid::new_v4().to_string();
        let status = self.status_code();
        let error_code = self.error_code();
        let user_message = self.user_message();
        let details = self.error_details();

        match &self {
            AppError::Fatal { .. } | AppError::Integrity(_) | AppError::Config(_) => {
                tracing::error!(
                    correlation_id = %correlation_id,
                    error_code = %error_code,
                    error = %self,
                    "fatal or integrity error"
                );
            }
            AppError::Transient { stage, .. } => {
                tracing::warn!(
                    correlation_id = %correlation_id,
                    error_code = %error_code,
                    stage = %stage,
                    error = %self,
                    "transient failure"
                );
            }
            _ => {
                tracing::info!(
                    correlation_id = %correlation_id,
                    error_code = %error_code,
                    error = %self,
                    "client error"
                );
            }
        }

        let error_response = ErrorResponse {
            error: self.to_string(),
            error_code: error_code.to_string(),
            message: user_message,
            details,
            correlation_id,
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        (status, Json(error_response)).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Fatal {
            reason: err.to_string(),
        }
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() || err.status().map(|s| s.is_server_error()).unwrap_or(false) {
            AppError::Transient {
                stage: "http".to_string(),
                source: err.to_string(),
            }
        } else {
            AppError::Permanent {
                stage: "http".to_string(),
                reason: err.to_string(),
            }
        }
    }
}

/// Result type alias for application errors.
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_errors_are_retryable() {
        let err = AppError::transient("ingest", "connection reset");
        assert!(err.is_retryable());
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn permanent_errors_are_not_retryable() {
        let err = AppError::permanent("ingest", "404 not found");
        assert!(!err.is_retryable());
        assert_eq!(err.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn unauthorized_maps_to_401() {
        assert_eq!(AppError::Unauthorized.status_code(), StatusCode::UNAUTHORIZED);
    }
}
