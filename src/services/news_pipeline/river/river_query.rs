//! Assembles the ranked "river" of clusters. The ordering and windowing are
//! delegated to the `get_river_clusters` stored function so that a direct
//! SQL client sees the exact same ranking the HTTP surface does; this
//! module's job is filling in the per-cluster sub-article breakdown, which
//! needs the same host-normalization algorithm the ingestor uses.

use sqlx::PgPool;
use std::collections::HashMap;

use crate::error::Result;
use crate::models::article::normalize_host;
use crate::models::river::{RiverClusterRow, RiverQuery, RiverSubArticle, MAX_SUBS};
use crate::services::news_pipeline::host_normalize::is_aggregator_host;

struct RiverBaseRow {
    cluster_id: i64,
    score: f64,
    sources_count: i32,
    lead_article_id: i64,
    lead_title: String,
    lead_url: String,
    lead_dek: Option<String>,
    lead_author: Option<String>,
    lead_source_name: Option<String>,
    lead_homepage: Option<String>,
    lead_published_at: Option<chrono::DateTime<chrono::Utc>>,
    lead_content_status: Option<String>,
    lead_content_word_count: Option<i32>,
}

struct MemberArticle {
    article_id: i64,
    title: String,
    canonical_url: String,
    source_name: Option<String>,
    author: Option<String>,
    published_at: Option<chrono::DateTime<chrono::Utc>>,
}

pub async fn river(pool: &PgPool, query: RiverQuery) -> Result<Vec<RiverClusterRow>> {
    let base_rows: Vec<RiverBaseRow> = sqlx::query_as!(
        RiverBaseRow,
        r#"
        SELECT
            cluster_id, score, sources_count,
            lead_article_id, lead_title, lead_url, lead_dek, lead_author,
            lead_source_name, lead_homepage, lead_published_at,
            lead_content_status, lead_content_word_count
        FROM get_river_clusters($1, $2, $3, $4)
        "#,
        query.view.is_latest(),
        query.window_hours as i32,
        query.limit as i32,
        query.category,
    )
    .fetch_all(pool)
    .await?;

    let mut rows = Vec::with_capacity(base_rows.len());
    for base in base_rows {
        let (subs, all_articles_by_source) = fetch_sub_articles(pool, base.cluster_id, &base).await?;
        rows.push(RiverClusterRow {
            cluster_id: base.cluster_id,
            score: base.score,
            sources_count: base.sources_count,
            lead_article_id: base.lead_article_id,
            lead_title: base.lead_title,
            lead_url: base.lead_url,
            lead_dek: base.lead_dek,
            lead_author: base.lead_author,
            lead_source_name: base.lead_source_name,
            lead_homepage: base.lead_homepage,
            lead_published_at: base.lead_published_at,
            lead_content_status: base
                .lead_content_status
                .and_then(|s| serde_json::from_value(serde_json::Value::String(s)).ok()),
            lead_content_word_count: base.lead_content_word_count,
            subs,
            all_articles_by_source,
        });
    }

    Ok(rows)
}

async fn fetch_sub_articles(
    pool: &PgPool,
    cluster_id: i64,
    base: &RiverBaseRow,
) -> Result<(Vec<RiverSubArticle>, HashMap<String, Vec<RiverSubArticle>>)> {
    let members: Vec<MemberArticle> = sqlx::query_as!(
        MemberArticle,
        r#"
        SELECT a.id AS article_id, a.title, a.canonical_url,
               s.name AS source_name, a.author, a.published_at
        FROM article_clusters ac
        JOIN articles a ON a.id = ac.article_id
        JOIN sources s ON s.id = a.source_id
        WHERE ac.cluster_id = $1 AND a.id != $2
        ORDER BY a.published_at DESC NULLS LAST
        "#,
        cluster_id,
        base.lead_article_id,
    )
    .fetch_all(pool)
    .await?;

    let lead_host = normalize_host(
        url::Url::parse(&base.lead_url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_default()
            .as_str(),
    );

    let mut by_host: HashMap<String, Vec<RiverSubArticle>> = HashMap::new();
    for member in members {
        let Some(host) = url::Url::parse(&member.canonical_url)
            .ok()
            .and_then(|u| u.host_str().map(normalize_host))
        else {
            continue;
        };
        if is_aggregator_host(&host) {
            continue;
        }

        let entry = by_host.entry(host.clone()).or_default();
        entry.push(RiverSubArticle {
            article_id: member.article_id,
            title: member.title,
            url: member.canonical_url,
            source_name: member.source_name,
            author: member.author,
            published_at: member.published_at,
            host,
            article_count: 0,
        });
    }

    for articles in by_host.values_mut() {
        let count = articles.len() as i32;
        for article in articles.iter_mut() {
            article.article_count = count;
        }
    }

    let non_lead_hosts: Vec<&String> = by_host.keys().filter(|h| **h != lead_host).collect();
    let only_lead_host_remains = non_lead_hosts.is_empty() && by_host.contains_key(&lead_host);

    // Pick one representative (most recent) per host, across the whole
    // candidate set, before ranking and truncating — iterating a HashMap
    // directly here would make the truncated-8 survivors depend on the
    // process's random hash seed instead of the data.
    let mut subs: Vec<RiverSubArticle> = by_host
        .iter()
        .filter(|(host, _)| host.as_str() != lead_host.as_str() || only_lead_host_remains)
        .filter_map(|(_, articles)| {
            articles
                .iter()
                .max_by(|a, b| a.published_at.cmp(&b.published_at))
                .cloned()
        })
        .collect();
    subs.sort_by(|a, b| b.published_at.cmp(&a.published_at).then_with(|| a.host.cmp(&b.host)));
    subs.truncate(MAX_SUBS);

    Ok((subs, by_host))
}
