//! Scheduler authentication: a request is authorized if it carries the
//! platform's cron header, the admin token as a `?token=` query param, or
//! the admin token as a bearer credential. There is no per-user identity —
//! the Scheduler has exactly one caller, the cron trigger.

use axum::{
    extract::{Query, Request, State},
    http::{header::AUTHORIZATION, StatusCode},
    middleware::Next,
    response::Response,
    Json,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use crate::config::SchedulerConfig;

/// Header a platform's own cron dispatcher is expected to set; its mere
/// presence authorizes the request (it cannot be set by external callers).
pub const PLATFORM_CRON_HEADER: &str = "x-platform-cron";

#[derive(Debug, Deserialize)]
pub struct TokenQuery {
    pub token: Option<String>,
}

/// Constant-time token comparison to avoid leaking the admin token through
/// response-time side channels.
fn tokens_match(provided: &str, expected: &str) -> bool {
    let provided = provided.as_bytes();
    let expected = expected.as_bytes();
    if provided.len() != expected.len() {
        return false;
    }
    provided
        .iter()
        .zip(expected.iter())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}

/// Authenticate a cron request against `ADMIN_TOKEN` via header, query
/// param, or bearer token. Rejects with `401 {ok:false, error:"unauthorized"}`.
pub async fn admin_auth_middleware(
    State(scheduler): State<Arc<SchedulerConfig>>,
    Query(query): Query<TokenQuery>,
    request: Request,
    next: Next,
) -> Result<Response, (StatusCode, Json<serde_json::Value>)> {
    let has_cron_header = request.headers().contains_key(PLATFORM_CRON_HEADER);

    let query_token_ok = query
        .token
        .as_deref()
        .map(|t| tokens_match(t, &scheduler.admin_token))
        .unwrap_or(false);

    let bearer_ok = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(|t| tokens_match(t, &scheduler.admin_token))
        .unwrap_or(false);

    if has_cron_header || query_token_ok || bearer_ok {
        Ok(next.run(request).await)
    } else {
        Err((
            StatusCode::UNAUTHORIZED,
            Json(json!({ "ok": false, "error": "unauthorized" })),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_time_compare_matches_equal_tokens() {
        assert!(tokens_match("abc123", "abc123"));
        assert!(!tokens_match("abc123", "abc124"));
        assert!(!tokens_match("short", "much-longer-token"));
    }
}
