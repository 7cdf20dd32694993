use crate::monitoring::CorrelationId;
use axum::{
    extract::Request,
    http::{HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use std::time::Instant;

/// Header name for correlation ID
pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";

/// Attach a correlation ID (propagated or generated) to the request span and
/// response headers, and log the request/response at INFO/WARN/ERROR
/// depending on status.
pub async fn tracing_middleware(mut request: Request, next: Next) -> Response {
    let start_time = Instant::now();

    let correlation_id = CorrelationId::from_header(
        request
            .headers()
            .get(CORRELATION_ID_HEADER)
            .and_then(|h| h.to_str().ok()),
    );
    request.extensions_mut().insert(correlation_id.clone());

    let span = tracing::info_span!(
        "http_request",
        correlation_id = %correlation_id,
        method = %request.method(),
        uri = %request.uri(),
    );
    let _enter = span.enter();

    let method = request.method().clone();
    let uri = request.uri().clone();

    let mut response = next.run(request).await;

    let duration = start_time.elapsed();
    let status = response.status().as_u16();

    if status >= 500 {
        tracing::error!(correlation_id = %correlation_id, %method, %uri, status, duration_ms = duration.as_millis() as u64, "request failed");
    } else if status >= 400 {
        tracing::warn!(correlation_id = %correlation_id, %method, %uri, status, duration_ms = duration.as_millis() as u64, "request client error");
    } else {
        tracing::info!(correlation_id = %correlation_id, %method, %uri, status, duration_ms = duration.as_millis() as u64, "request completed");
    }

    if let Ok(header_value) = HeaderValue::from_str(&correlation_id.to_string()) {
        response
            .headers_mut()
            .insert(HeaderName::from_static(CORRELATION_ID_HEADER), header_value);
    }

    response
}

/// Helper to retrieve the correlation ID a request was tagged with.
pub fn get_correlation_id_from_request(request: &Request) -> Option<CorrelationId> {
    request.extensions().get::<CorrelationId>().cloned()
}
