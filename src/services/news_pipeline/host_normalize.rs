//! Thin façade over the canonical host/URL normalization in
//! [`crate::models::article`]. Both the ingest path and the river query
//! import through here so there is exactly one place that could drift.

pub use crate::models::article::{canonicalize_url, normalize_host};
use crate::models::source::AGGREGATOR_HOST_BLOCKLIST;

pub fn is_aggregator_host(host: &str) -> bool {
    let normalized = normalize_host(host);
    AGGREGATOR_HOST_BLOCKLIST
        .iter()
        .any(|blocked| normalized == *blocked)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_known_aggregators() {
        assert!(is_aggregator_host("news.google.com"));
        assert!(!is_aggregator_host("reuters.com"));
    }
}
