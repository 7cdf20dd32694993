//! Fetches RSS/Atom feeds for sources due a refresh and upserts their items
//! as `articles` rows.

use chrono::{DateTime, Utc};
use futures::stream::{FuturesUnordered, StreamExt};
use reqwest::Client;
use serde::Serialize;
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore};

use crate::error::{AppError, Result};
use crate::models::article::{canonicalize_url, clean_text, normalize_host};
use crate::services::news_pipeline::host_normalize::is_aggregator_host;

const FEED_FETCH_TIMEOUT_SECS: u64 = 12;
const USER_AGENT: &str = "climate-river/0.1 (+https://climateriver.example/bot)";
const MAX_REDIRECTS: usize = 3;
const CONSECUTIVE_FAILURES_BEFORE_ERROR_STATUS: i32 = 3;

#[derive(Debug, Default, Serialize)]
pub struct IngestResult {
    pub fetched: u32,
    pub inserted: u32,
    pub updated: u32,
    pub errors: u32,
}

struct CandidateSource {
    id: i64,
    feed_uri: String,
    consecutive_failures: i32,
}

/// Per-normalized-host mutex so at most one feed fetch per host is ever
/// in flight at a time, regardless of how many sources share that host.
#[derive(Default)]
struct HostLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl HostLocks {
    async fn lock_for(&self, host: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(host.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

/// Ingest up to `limit` due feeds, fairness ordered oldest-fetched-first
/// then highest-weight. Bounded to `concurrency` feeds in flight.
pub async fn ingest(pool: &PgPool, limit: u32, concurrency: usize) -> Result<IngestResult> {
    let sources = sqlx::query_as!(
        CandidateSource,
        r#"
        SELECT id, feed_uri, consecutive_failures
        FROM sources
        WHERE feed_uri LIKE 'rss://%'
        ORDER BY last_fetched_at ASC NULLS FIRST, weight DESC
        LIMIT $1
        "#,
        limit as i64
    )
    .fetch_all(pool)
    .await?;

    run_sources(pool, sources, concurrency).await
}

/// Force-refetch sources that have gone stale beyond `older_than_hours` (or
/// were never fetched), independent of `ingest`'s normal fairness ordering —
/// a catch-up pass for sources the regular cadence has been skipping.
pub async fn backfill(
    pool: &PgPool,
    older_than_hours: i64,
    batch: u32,
    concurrency: usize,
) -> Result<IngestResult> {
    let sources = sqlx::query_as!(
        CandidateSource,
        r#"
        SELECT id, feed_uri, consecutive_failures
        FROM sources
        WHERE feed_uri LIKE 'rss://%'
          AND (last_fetched_at IS NULL OR last_fetched_at < now() - ($1 || ' hours')::interval)
        ORDER BY last_fetched_at ASC NULLS FIRST, weight DESC
        LIMIT $2
        "#,
        older_than_hours,
        batch as i64
    )
    .fetch_all(pool)
    .await?;

    run_sources(pool, sources, concurrency).await
}

async fn run_sources(pool: &PgPool, sources: Vec<CandidateSource>, concurrency: usize) -> Result<IngestResult> {
    let client = Client::builder()
        .timeout(std::time::Duration::from_secs(FEED_FETCH_TIMEOUT_SECS))
        .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| AppError::fatal(format!("building HTTP client: {e}")))?;

    let semaphore = Arc::new(Semaphore::new(concurrency));
    let host_locks = Arc::new(HostLocks::default());

    let mut tasks = FuturesUnordered::new();
    for source in sources {
        let pool = pool.clone();
        let client = client.clone();
        let semaphore = semaphore.clone();
        let host_locks = host_locks.clone();
        tasks.push(async move {
            let _permit = semaphore.acquire().await.expect("semaphore closed");
            fetch_one_source(&pool, &client, &host_locks, source).await
        });
    }

    let mut result = IngestResult::default();
    while let Some(outcome) = tasks.next().await {
        result.fetched += 1;
        match outcome {
            Ok((inserted, updated)) => {
                result.inserted += inserted;
                result.updated += updated;
            }
            Err(err) => {
                tracing::warn!(error = %err, "feed fetch failed");
                result.errors += 1;
            }
        }
    }

    Ok(result)
}

async fn fetch_one_source(
    pool: &PgPool,
    client: &Client,
    host_locks: &HostLocks,
    source: CandidateSource,
) -> Result<(u32, u32)> {
    let Some(feed_url) = source.feed_uri.strip_prefix("rss://") else {
        return Err(AppError::permanent("ingest", "source is not an rss feed"));
    };

    let host = reqwest::Url::parse(feed_url)
        .ok()
        .and_then(|u| u.host_str().map(normalize_host))
        .unwrap_or_default();
    let lock = host_locks.lock_for(&host).await;
    let _guard = lock.lock().await;

    let fetch_result = fetch_and_parse(client, feed_url).await;

    match fetch_result {
        Ok(items) => {
            mark_fetch_status(pool, source.id, true, 0).await?;
            let mut inserted = 0u32;
            let mut updated = 0u32;
            for item in items {
                match upsert_article(pool, source.id, item).await {
                    Ok(true) => inserted += 1,
                    Ok(false) => updated += 1,
                    Err(AppError::Permanent { .. }) => continue,
                    Err(err) => return Err(err),
                }
            }
            Ok((inserted, updated))
        }
        Err(err) => {
            let failures = source.consecutive_failures + 1;
            mark_fetch_status(pool, source.id, false, failures).await?;
            Err(err)
        }
    }
}

async fn mark_fetch_status(
    pool: &PgPool,
    source_id: i64,
    success: bool,
    consecutive_failures: i32,
) -> Result<()> {
    let status = if success {
        "success"
    } else if consecutive_failures >= CONSECUTIVE_FAILURES_BEFORE_ERROR_STATUS {
        "error"
    } else {
        "pending"
    };

    sqlx::query!(
        r#"
        UPDATE sources
        SET last_fetch_status = $1, last_fetched_at = now(), consecutive_failures = $2
        WHERE id = $3
        "#,
        status,
        consecutive_failures,
        source_id,
    )
    .execute(pool)
    .await?;

    Ok(())
}

struct FeedItem {
    canonical_url: String,
    title: String,
    dek: Option<String>,
    author: Option<String>,
    published_at: Option<DateTime<Utc>>,
    publisher_host: String,
}

async fn fetch_and_parse(client: &Client, feed_url: &str) -> Result<Vec<FeedItem>> {
    let response = client
        .get(feed_url)
        .send()
        .await
        .map_err(|e| AppError::transient("ingest", e))?;

    if response.status().is_server_error() || response.status() == 429 {
        return Err(AppError::transient(
            "ingest",
            format!("http {}", response.status()),
        ));
    }
    if !response.status().is_success() {
        return Err(AppError::permanent(
            "ingest",
            format!("http {}", response.status()),
        ));
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| AppError::transient("ingest", e))?;

    let feed = feed_rs::parser::parse(&bytes[..])
        .map_err(|e| AppError::permanent("ingest", format!("feed parse error: {e}")))?;

    let mut items = Vec::with_capacity(feed.entries.len());
    for entry in feed.entries {
        let Some(link) = entry.links.first().map(|l| l.href.clone()) else {
            continue;
        };
        let Some(canonical_url) = canonicalize_url(&link) else {
            continue;
        };
        let host = reqwest::Url::parse(&canonical_url)
            .ok()
            .and_then(|u| u.host_str().map(normalize_host))
            .unwrap_or_default();
        if is_aggregator_host(&host) {
            continue;
        }

        let title = entry
            .title
            .map(|t| clean_text(&t.content))
            .unwrap_or_default();
        if title.is_empty() {
            continue;
        }

        let dek = entry.summary.map(|s| clean_text(&s.content));
        let author = entry.authors.first().map(|a| a.name.clone());
        let published_at = entry.published.or(entry.updated);

        items.push(FeedItem {
            canonical_url,
            title,
            dek,
            author,
            published_at,
            publisher_host: host,
        });
    }

    Ok(items)
}

/// Upsert by canonical URL. Returns `Ok(true)` for a fresh insert,
/// `Ok(false)` for an update of an existing row. Non-identifying fields are
/// only overwritten when the incoming item is newer than the stored row.
async fn upsert_article(pool: &PgPool, source_id: i64, item: FeedItem) -> Result<bool> {
    let row = sqlx::query!(
        r#"
        INSERT INTO articles (
            source_id, canonical_url, title, dek, author,
            publisher_host, published_at, fetched_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, now())
        ON CONFLICT (canonical_url) DO UPDATE SET
            title = CASE WHEN EXCLUDED.published_at IS NOT NULL
                           AND (articles.published_at IS NULL OR EXCLUDED.published_at > articles.published_at)
                         THEN EXCLUDED.title ELSE articles.title END,
            dek = CASE WHEN EXCLUDED.published_at IS NOT NULL
                         AND (articles.published_at IS NULL OR EXCLUDED.published_at > articles.published_at)
                       THEN EXCLUDED.dek ELSE articles.dek END,
            author = CASE WHEN EXCLUDED.published_at IS NOT NULL
                            AND (articles.published_at IS NULL OR EXCLUDED.published_at > articles.published_at)
                          THEN EXCLUDED.author ELSE articles.author END,
            published_at = CASE WHEN EXCLUDED.published_at IS NOT NULL
                                  AND (articles.published_at IS NULL OR EXCLUDED.published_at > articles.published_at)
                                THEN EXCLUDED.published_at ELSE articles.published_at END,
            fetched_at = now()
        RETURNING (xmax = 0) AS "inserted!"
        "#,
        source_id,
        item.canonical_url,
        item.title,
        item.dek,
        item.author,
        item.publisher_host,
        item.published_at,
    )
    .fetch_one(pool)
    .await?;

    Ok(row.inserted)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consecutive_failure_threshold_matches_contract() {
        assert_eq!(CONSECUTIVE_FAILURES_BEFORE_ERROR_STATUS, 3);
    }
}
