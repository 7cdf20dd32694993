//! Fetches and extracts full article bodies, classifying paywalls,
//! timeouts, and thin/blocked responses as data rather than errors.

use futures::stream::{FuturesUnordered, StreamExt};
use reqwest::Client;
use scraper::{Html, Selector};
use serde::Serialize;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

use crate::error::Result;
use crate::models::article::normalize_host;
use crate::models::source::PAYWALL_HOSTS;

const PREFETCH_TIMEOUT_SECS: u64 = 10;
const MAX_REDIRECTS: usize = 3;
const DESKTOP_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";
const MIN_WORD_COUNT: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PrefetchOutcome {
    Success,
    Paywall,
    Blocked,
    Timeout,
    NotFound,
    Error,
}

impl PrefetchOutcome {
    pub fn as_content_status(&self) -> &'static str {
        match self {
            PrefetchOutcome::Success => "success",
            PrefetchOutcome::Paywall => "paywall",
            PrefetchOutcome::Blocked => "blocked",
            PrefetchOutcome::Timeout => "timeout",
            PrefetchOutcome::NotFound => "not_found",
            PrefetchOutcome::Error => "error",
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PrefetchResult {
    pub attempted: u32,
    pub outcomes: Vec<(i64, PrefetchOutcome, Option<i32>)>,
}

struct PendingArticle {
    id: i64,
    canonical_url: String,
}

/// Selects up to `limit` article ids awaiting content, most recent first.
/// Kept separate from `prefetch` so a caller can target specific ids
/// (tests, reprocessing a failed batch) without going through selection.
pub async fn select_pending(pool: &PgPool, limit: u32) -> Result<Vec<i64>> {
    let rows = sqlx::query!(
        r#"
        SELECT id
        FROM articles
        WHERE content_status IS NULL
        ORDER BY published_at DESC NULLS LAST
        LIMIT $1
        "#,
        limit as i64
    )
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|r| r.id).collect())
}

/// Prefetch exactly the given article `ids`, bounded to `concurrency` in
/// flight.
pub async fn prefetch(pool: &PgPool, ids: &[i64], concurrency: usize) -> Result<PrefetchResult> {
    let articles = sqlx::query_as!(
        PendingArticle,
        r#"
        SELECT id, canonical_url
        FROM articles
        WHERE id = ANY($1)
        "#,
        ids
    )
    .fetch_all(pool)
    .await?;

    let client = Client::builder()
        .timeout(Duration::from_secs(PREFETCH_TIMEOUT_SECS))
        .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
        .user_agent(DESKTOP_USER_AGENT)
        .build()
        .map_err(|e| crate::error::AppError::fatal(format!("building HTTP client: {e}")))?;

    let semaphore = Arc::new(Semaphore::new(concurrency));
    let mut tasks = FuturesUnordered::new();
    for article in articles {
        let client = client.clone();
        let semaphore = semaphore.clone();
        tasks.push(async move {
            let _permit = semaphore.acquire().await.expect("semaphore closed");
            let (outcome, text, html, word_count) = fetch_and_extract(&client, &article.canonical_url).await;
            (article.id, outcome, text, html, word_count)
        });
    }

    let mut outcomes = Vec::new();
    while let Some((id, outcome, text, html, word_count)) = tasks.next().await {
        persist_result(pool, id, outcome, text, html, word_count).await?;
        outcomes.push((id, outcome, word_count));
    }

    Ok(PrefetchResult {
        attempted: outcomes.len() as u32,
        outcomes,
    })
}

async fn fetch_and_extract(
    client: &Client,
    url: &str,
) -> (PrefetchOutcome, Option<String>, Option<String>, Option<i32>) {
    if let Some(host) = reqwest::Url::parse(url).ok().and_then(|u| u.host_str().map(normalize_host)) {
        if PAYWALL_HOSTS.iter().any(|h| host == *h || host.ends_with(&format!(".{h}"))) {
            return (PrefetchOutcome::Paywall, None, None, None);
        }
    }

    let response = match client.get(url).send().await {
        Ok(r) => r,
        Err(e) if e.is_timeout() => return (PrefetchOutcome::Timeout, None, None, None),
        Err(_) => return (PrefetchOutcome::Error, None, None, None),
    };

    let status = response.status();
    if status == 402 || status == 403 || status == 451 {
        return (PrefetchOutcome::Paywall, None, None, None);
    }
    if status == 404 || status == 410 {
        return (PrefetchOutcome::NotFound, None, None, None);
    }
    if !status.is_success() {
        return (PrefetchOutcome::Error, None, None, None);
    }

    let body = match response.text().await {
        Ok(b) => b,
        Err(_) => return (PrefetchOutcome::Error, None, None, None),
    };

    let (text, html) = extract_article_body(&body);
    let word_count = text.split_whitespace().count();

    if word_count < MIN_WORD_COUNT {
        return (PrefetchOutcome::Blocked, Some(text), Some(html), Some(word_count as i32));
    }

    (PrefetchOutcome::Success, Some(text), Some(html), Some(word_count as i32))
}

/// Readability-style extraction: prefer `<article>`, fall back to the
/// largest `<p>`-bearing container, worst case the raw `<body>` text.
fn extract_article_body(html: &str) -> (String, String) {
    let document = Html::parse_document(html);

    let article_selector = Selector::parse("article").expect("static selector is valid");
    if let Some(article) = document.select(&article_selector).next() {
        return (clean_extracted_text(&article.text().collect::<String>()), article.html());
    }

    let paragraph_selector = Selector::parse("p").expect("static selector is valid");
    let paragraphs: Vec<String> = document
        .select(&paragraph_selector)
        .map(|p| p.text().collect::<String>())
        .filter(|t| t.split_whitespace().count() > 5)
        .collect();

    let text = clean_extracted_text(&paragraphs.join("\n\n"));
    (text, html.to_string())
}

fn clean_extracted_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

async fn persist_result(
    pool: &PgPool,
    article_id: i64,
    outcome: PrefetchOutcome,
    text: Option<String>,
    html: Option<String>,
    word_count: Option<i32>,
) -> Result<()> {
    sqlx::query!(
        r#"
        UPDATE articles
        SET content_status = $1,
            content_text = $2,
            content_html = $3,
            content_word_count = $4,
            content_fetched_at = now()
        WHERE id = $5
        "#,
        outcome.as_content_status(),
        text,
        html,
        word_count,
        article_id,
    )
    .execute(pool)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paywall_outcome_maps_to_paywall_status() {
        assert_eq!(PrefetchOutcome::Paywall.as_content_status(), "paywall");
    }

    #[test]
    fn thin_body_is_classified_blocked_not_success() {
        let (_, html) = extract_article_body("<html><body><p>too short</p></body></html>");
        assert!(html.split_whitespace().count() < MIN_WORD_COUNT);
    }
}
