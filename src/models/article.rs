//! The `articles` row and its derived-field enums (content-prefetch status,
//! rewrite bookkeeping). Canonical-URL normalization lives here because the
//! ingest path and the river query must agree on the exact same algorithm.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
pub enum ContentStatus {
    Success,
    Paywall,
    Blocked,
    Timeout,
    NotFound,
    Error,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct Article {
    pub id: i64,
    pub source_id: i64,
    pub canonical_url: String,
    pub title: String,
    pub dek: Option<String>,
    pub author: Option<String>,
    pub publisher_name: Option<String>,
    pub publisher_host: String,
    pub publisher_homepage: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub fetched_at: DateTime<Utc>,

    pub embedding: Option<pgvector::Vector>,

    pub content_text: Option<String>,
    pub content_html: Option<String>,
    pub content_word_count: Option<i32>,
    pub content_status: Option<ContentStatus>,
    pub content_fetched_at: Option<DateTime<Utc>>,

    pub rewritten_title: Option<String>,
    pub rewritten_at: Option<DateTime<Utc>>,
    pub rewrite_model: Option<String>,
    pub rewrite_notes: Option<String>,
}

impl Article {
    /// Title the presentation layer should use: the rewritten lead title
    /// when one exists and was accepted, otherwise the original.
    pub fn display_title(&self) -> &str {
        self.rewritten_title.as_deref().unwrap_or(&self.title)
    }
}

static TRACKING_PARAM_PREFIXES: &[&str] = &["utm_", "fbclid", "gclid", "mc_cid", "mc_eid", "ref"];

static HOST_STRIP_PREFIXES: &[&str] = &["www.", "m.", "amp.", "edition.", "news.", "beta."];

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Strip the aggregator-specific noise prefixes from a host, applied
/// identically whether normalizing at ingest time or filtering the river
/// query's candidate set.
pub fn normalize_host(host: &str) -> String {
    let mut host = host.to_lowercase();
    loop {
        let stripped = HOST_STRIP_PREFIXES
            .iter()
            .find_map(|prefix| host.strip_prefix(prefix).map(|s| s.to_string()));
        match stripped {
            Some(s) if s != host => host = s,
            _ => break,
        }
    }
    host
}

/// Resolve a raw article URL to its canonical form: lowercase host with
/// noise prefixes stripped, tracking query params removed, no fragment.
pub fn canonicalize_url(raw: &str) -> Option<String> {
    let mut url = Url::parse(raw.trim()).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }

    let host = url.host_str()?.to_string();
    let normalized_host = normalize_host(&host);
    url.set_host(Some(&normalized_host)).ok()?;
    url.set_fragment(None);

    let retained_pairs: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| {
            !TRACKING_PARAM_PREFIXES
                .iter()
                .any(|prefix| k.starts_with(prefix))
        })
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    if retained_pairs.is_empty() {
        url.set_query(None);
    } else {
        // `query_pairs()` hands back decoded strings; re-encode before
        // rejoining or a retained value containing `&`/`=`/`#` would corrupt
        // the query string.
        let query = retained_pairs
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");
        url.set_query(Some(&query));
    }

    let mut canonical = url.to_string();
    if canonical.ends_with('/') && canonical.matches('/').count() <= 3 {
        canonical.pop();
    }
    Some(canonical)
}

/// Collapse run-on whitespace a scraped title/dek commonly contains.
pub fn clean_text(text: &str) -> String {
    WHITESPACE.replace_all(text.trim(), " ").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_www_and_tracking_params() {
        let a = canonicalize_url("HTTPS://WWW.Example.com/x?utm_source=a").unwrap();
        let b = canonicalize_url("https://example.com/x").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn strips_chained_prefixes() {
        assert_eq!(normalize_host("amp.www.Example.com"), "example.com");
    }

    #[test]
    fn rejects_non_http_schemes() {
        assert_eq!(canonicalize_url("ftp://example.com/x"), None);
    }

    #[test]
    fn preserves_non_tracking_query_params() {
        let url = canonicalize_url("https://example.com/x?id=42&utm_campaign=y").unwrap();
        assert!(url.contains("id=42"));
        assert!(!url.contains("utm_campaign"));
    }

    #[test]
    fn re_encodes_retained_params_with_reserved_characters() {
        let url = canonicalize_url("https://example.com/x?q=climate%20%26%20policy").unwrap();
        assert!(url.contains("q=climate%20%26%20policy"));
    }
}
