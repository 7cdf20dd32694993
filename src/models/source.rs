//! A `sources` row: a feed, web-crawl target, or web-discovery query that
//! the ingestor and discoverer treat as a unit of fetch/trust.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How a source is reached. `rss://…` is fetched directly; `web://host` is
/// probed by the feed discoverer or scraped by web discovery; `web-discovery://query`
/// is never fetched itself, only used to seed new `web://` sources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FeedDescriptor {
    Rss { url: String },
    Web { host: String },
    WebDiscoveryQuery { query: String },
}

impl FeedDescriptor {
    pub fn as_uri(&self) -> String {
        match self {
            FeedDescriptor::Rss { url } => format!("rss://{url}"),
            FeedDescriptor::Web { host } => format!("web://{host}"),
            FeedDescriptor::WebDiscoveryQuery { query } => format!("web-discovery://{query}"),
        }
    }

    pub fn parse(uri: &str) -> Option<Self> {
        if let Some(rest) = uri.strip_prefix("rss://") {
            Some(FeedDescriptor::Rss {
                url: rest.to_string(),
            })
        } else if let Some(rest) = uri.strip_prefix("web-discovery://") {
            Some(FeedDescriptor::WebDiscoveryQuery {
                query: rest.to_string(),
            })
        } else if let Some(rest) = uri.strip_prefix("web://") {
            Some(FeedDescriptor::Web {
                host: rest.to_string(),
            })
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum FetchStatus {
    Pending,
    Success,
    Error,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct Source {
    pub id: i64,
    pub slug: String,
    pub name: String,
    pub feed_uri: String,
    pub homepage: Option<String>,
    pub weight: i32,
    pub last_fetch_status: FetchStatus,
    pub last_fetched_at: Option<DateTime<Utc>>,
    pub consecutive_failures: i32,
    pub created_at: DateTime<Utc>,
}

impl Source {
    pub fn descriptor(&self) -> Option<FeedDescriptor> {
        FeedDescriptor::parse(&self.feed_uri)
    }
}

/// Hosts known to aggregate rather than originate climate reporting; never
/// surfaced as a lead or sub-article source.
pub const AGGREGATOR_HOST_BLOCKLIST: &[&str] =
    &["news.google.com", "news.yahoo.com", "msn.com"];

/// Hosts that reliably paywall, short-circuiting the content prefetcher.
pub const PAYWALL_HOSTS: &[&str] = &[
    "nytimes.com",
    "wsj.com",
    "ft.com",
    "economist.com",
    "bloomberg.com",
    "washingtonpost.com",
    "newyorker.com",
    "theathletic.com",
    "foreignpolicy.com",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_roundtrips() {
        let d = FeedDescriptor::Rss {
            url: "https://example.com/feed.xml".to_string(),
        };
        assert_eq!(FeedDescriptor::parse(&d.as_uri()), Some(d));
    }

    #[test]
    fn web_discovery_descriptor() {
        let uri = "web-discovery://ipcc report 2026";
        match FeedDescriptor::parse(uri) {
            Some(FeedDescriptor::WebDiscoveryQuery { query }) => {
                assert_eq!(query, "ipcc report 2026")
            }
            other => panic!("unexpected parse: {other:?}"),
        }
    }
}
