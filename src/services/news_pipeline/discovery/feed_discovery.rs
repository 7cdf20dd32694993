//! Probes `web://` sources for a feed, upgrading the source's descriptor
//! once one is found.

use reqwest::Client;
use scraper::{Html, Selector};
use serde::Serialize;
use sqlx::PgPool;
use std::time::Duration;

use crate::error::{AppError, Result};

const FEED_DISCOVERY_TIMEOUT_SECS: u64 = 10;
const USER_AGENT: &str = "climate-river/0.1 (+https://climateriver.example/bot)";

const CANDIDATE_PATHS: &[&str] = &[
    "/feed",
    "/rss",
    "/feed.xml",
    "/atom.xml",
    "/feeds/posts/default",
    "/rss.xml",
];

#[derive(Debug, Default, Serialize)]
pub struct FeedDiscoveryResult {
    pub probed: u32,
    pub upgraded: u32,
}

struct WebSource {
    id: i64,
    feed_uri: String,
}

/// Probe up to `limit` `web://` sources for a feed; upgrade the ones found.
pub async fn discover_feeds(pool: &PgPool, limit: u32) -> Result<FeedDiscoveryResult> {
    let sources = sqlx::query_as!(
        WebSource,
        r#"
        SELECT id, feed_uri
        FROM sources
        WHERE feed_uri LIKE 'web://%'
        ORDER BY last_fetched_at ASC NULLS FIRST
        LIMIT $1
        "#,
        limit as i64
    )
    .fetch_all(pool)
    .await?;

    let client = Client::builder()
        .timeout(Duration::from_secs(FEED_DISCOVERY_TIMEOUT_SECS))
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| AppError::fatal(format!("building HTTP client: {e}")))?;

    let mut result = FeedDiscoveryResult::default();
    for source in sources {
        result.probed += 1;
        let Some(host) = source.feed_uri.strip_prefix("web://") else {
            continue;
        };
        match probe_host(&client, host).await {
            Ok(Some(feed_url)) => {
                sqlx::query!(
                    "UPDATE sources SET feed_uri = $1 WHERE id = $2",
                    format!("rss://{feed_url}"),
                    source.id,
                )
                .execute(pool)
                .await?;
                result.upgraded += 1;
            }
            Ok(None) => {}
            Err(err) => tracing::warn!(error = %err, host, "feed discovery probe failed"),
        }
    }

    Ok(result)
}

async fn probe_host(client: &Client, host: &str) -> Result<Option<String>> {
    for path in CANDIDATE_PATHS {
        let candidate = format!("https://{host}{path}");
        if let Ok(response) = client.get(&candidate).send().await {
            if response.status().is_success() {
                if let Ok(bytes) = response.bytes().await {
                    if feed_rs::parser::parse(&bytes[..])
                        .map(|feed| !feed.entries.is_empty())
                        .unwrap_or(false)
                    {
                        return Ok(Some(candidate));
                    }
                }
            }
        }
    }

    homepage_alternate_link(client, host).await
}

async fn homepage_alternate_link(client: &Client, host: &str) -> Result<Option<String>> {
    let homepage = format!("https://{host}/");
    let response = match client.get(&homepage).send().await {
        Ok(r) if r.status().is_success() => r,
        _ => return Ok(None),
    };
    let body = response.text().await.unwrap_or_default();

    let document = Html::parse_document(&body);
    let selector = Selector::parse(r#"link[rel="alternate"][type="application/rss+xml"]"#)
        .expect("static selector is valid");

    Ok(document
        .select(&selector)
        .find_map(|el| el.value().attr("href"))
        .map(|href| resolve_relative(&homepage, href)))
}

fn resolve_relative(base: &str, href: &str) -> String {
    reqwest::Url::parse(base)
        .and_then(|b| b.join(href))
        .map(|u| u.to_string())
        .unwrap_or_else(|_| href.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidate_paths_cover_common_feed_locations() {
        assert!(CANDIDATE_PATHS.contains(&"/feed"));
        assert!(CANDIDATE_PATHS.contains(&"/atom.xml"));
    }

    #[test]
    fn resolves_relative_href_against_homepage() {
        let resolved = resolve_relative("https://example.com/", "/feed.xml");
        assert_eq!(resolved, "https://example.com/feed.xml");
    }
}
