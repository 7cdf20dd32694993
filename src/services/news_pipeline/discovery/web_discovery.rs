//! Query-driven web discovery: asks the chat completion service for URLs
//! matching a topic query, then seeds a source (and a best-effort article)
//! per newly-seen host.

use serde::Serialize;
use sqlx::PgPool;

use crate::error::Result;
use crate::models::article::{canonicalize_url, clean_text, normalize_host};
use crate::services::news_pipeline::host_normalize::is_aggregator_host;
use crate::services::news_pipeline::processing::ChatClient;

/// Weight assigned to sources created via web discovery; below the
/// baseline weight of a curated, manually-seeded feed.
const WEB_DISCOVERY_SOURCE_WEIGHT: i32 = 4;

const STANDARD_QUERIES: &[&str] = &[
    "climate policy announcement this week",
    "new climate science research published",
    "climate litigation ruling",
    "renewable energy investment news",
    "climate impact report",
    "corporate net zero announcement",
];

const BREAKING_QUERIES: &[&str] = &[
    "breaking climate news today",
    "major climate disaster news",
];

const SYSTEM_PROMPT: &str = "You surface recent, reputable news article URLs for a given topic query. \
Respond with one URL per line, most relevant first. No commentary, no markdown.";

#[derive(Debug, Default, Serialize)]
pub struct WebDiscoveryResult {
    pub queries_run: u32,
    pub sources_created: u32,
    pub articles_created: u32,
}

/// Run up to `max_queries` queries (fewer, time-sensitive ones when
/// `breaking`), each returning up to `per_query` candidate URLs.
pub async fn discover_web(
    pool: &PgPool,
    chat_client: &ChatClient,
    max_queries: u32,
    per_query: u32,
    breaking: bool,
) -> Result<WebDiscoveryResult> {
    let queries = if breaking {
        BREAKING_QUERIES
    } else {
        STANDARD_QUERIES
    };

    let mut result = WebDiscoveryResult::default();
    for query in queries.iter().take(max_queries as usize) {
        result.queries_run += 1;
        let prompt = format!("Query: {query}\nDomain weight hint: prefer established news outlets and research institutions.");

        let completion = match chat_client.complete(SYSTEM_PROMPT, &prompt).await {
            Ok(text) => text,
            Err(err) => {
                tracing::warn!(error = %err, query, "web discovery query failed");
                continue;
            }
        };

        for line in completion.lines().take(per_query as usize) {
            let Some(canonical_url) = canonicalize_url(line.trim()) else {
                continue;
            };
            let Some(host) = reqwest::Url::parse(&canonical_url)
                .ok()
                .and_then(|u| u.host_str().map(normalize_host))
            else {
                continue;
            };
            if is_aggregator_host(&host) {
                continue;
            }

            let source_id = ensure_web_discovery_source(pool, &host, &mut result).await?;
            if insert_best_effort_article(pool, source_id, &canonical_url, &host).await? {
                result.articles_created += 1;
            }
        }
    }

    Ok(result)
}

async fn ensure_web_discovery_source(
    pool: &PgPool,
    host: &str,
    result: &mut WebDiscoveryResult,
) -> Result<i64> {
    if let Some(existing) = sqlx::query_scalar!(
        "SELECT id FROM sources WHERE feed_uri = $1",
        format!("web://{host}")
    )
    .fetch_optional(pool)
    .await?
    {
        return Ok(existing);
    }

    let slug = slugify(host);
    let id = sqlx::query_scalar!(
        r#"
        INSERT INTO sources (slug, name, feed_uri, homepage, weight, last_fetch_status)
        VALUES ($1, $2, $3, $4, $5, 'pending')
        ON CONFLICT (slug) DO UPDATE SET slug = EXCLUDED.slug
        RETURNING id
        "#,
        slug,
        host,
        format!("web://{host}"),
        format!("https://{host}"),
        WEB_DISCOVERY_SOURCE_WEIGHT,
    )
    .fetch_one(pool)
    .await?;

    result.sources_created += 1;
    Ok(id)
}

async fn insert_best_effort_article(
    pool: &PgPool,
    source_id: i64,
    canonical_url: &str,
    host: &str,
) -> Result<bool> {
    let title = clean_text(
        canonical_url
            .rsplit('/')
            .find(|segment| !segment.is_empty())
            .unwrap_or(host)
            .replace(['-', '_'], " ")
            .as_str(),
    );

    let row = sqlx::query!(
        r#"
        INSERT INTO articles (source_id, canonical_url, title, publisher_host, fetched_at)
        VALUES ($1, $2, $3, $4, now())
        ON CONFLICT (canonical_url) DO NOTHING
        RETURNING id
        "#,
        source_id,
        canonical_url,
        title,
        host,
    )
    .fetch_optional(pool)
    .await?;

    Ok(row.is_some())
}

fn slugify(host: &str) -> String {
    host.chars()
        .map(|c| if c.is_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
        .collect::<String>()
        .trim_matches('-')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_replaces_dots_with_dashes() {
        assert_eq!(slugify("climate.example.com"), "climate-example-com");
    }

    #[test]
    fn breaking_query_set_is_smaller_and_time_sensitive() {
        assert!(BREAKING_QUERIES.len() < STANDARD_QUERIES.len());
    }
}
