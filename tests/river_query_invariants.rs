//! Invariants 1-4 and 8 from the testable-properties list, exercised against
//! a real Postgres instance with pgvector installed.

mod common;

use climate_river::models::river::{RiverQuery, RiverView};
use climate_river::river;
use common::TestDatabase;
use serial_test::serial;

#[tokio::test]
#[serial]
async fn dedup_keeps_a_single_row_per_canonical_url() {
    let db = TestDatabase::new().await;
    let source = db.insert_source("example-news").await;

    db.insert_article(source, "https://example.com/x", "First headline")
        .await;

    let second = sqlx::query!(
        r#"
        INSERT INTO articles (source_id, canonical_url, title, publisher_host, fetched_at)
        VALUES ($1, $2, $3, 'example.com', now())
        ON CONFLICT (canonical_url) DO NOTHING
        RETURNING id
        "#,
        source,
        "https://example.com/x",
        "Duplicate headline",
    )
    .fetch_optional(&db.pool)
    .await
    .unwrap();
    assert!(second.is_none(), "conflicting canonical_url must not insert a second row");

    let count: i64 = sqlx::query_scalar!(
        "SELECT count(*) AS \"count!\" FROM articles WHERE canonical_url = $1",
        "https://example.com/x"
    )
    .fetch_one(&db.pool)
    .await
    .unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
#[serial]
async fn article_cluster_membership_is_unique_per_article() {
    let db = TestDatabase::new().await;
    let source = db.insert_source("example-news").await;
    let article = db.insert_article(source, "https://example.com/y", "A story").await;

    let cluster_a: i64 = sqlx::query_scalar!(
        "INSERT INTO clusters (cluster_key) VALUES ($1) RETURNING id",
        "cluster-a"
    )
    .fetch_one(&db.pool)
    .await
    .unwrap();
    let cluster_b: i64 = sqlx::query_scalar!(
        "INSERT INTO clusters (cluster_key) VALUES ($1) RETURNING id",
        "cluster-b"
    )
    .fetch_one(&db.pool)
    .await
    .unwrap();

    sqlx::query!(
        "INSERT INTO article_clusters (article_id, cluster_id) VALUES ($1, $2)",
        article,
        cluster_a
    )
    .execute(&db.pool)
    .await
    .unwrap();

    let conflict = sqlx::query!(
        "INSERT INTO article_clusters (article_id, cluster_id) VALUES ($1, $2)",
        article,
        cluster_b
    )
    .execute(&db.pool)
    .await;

    assert!(conflict.is_err(), "an article must not belong to two clusters at once");
}

#[tokio::test]
#[serial]
async fn lead_article_is_always_a_cluster_member() {
    let db = TestDatabase::new().await;
    let source = db.insert_source("example-news").await;
    let lead = db.insert_article(source, "https://example.com/lead", "Lead story").await;

    let cluster_id: i64 = sqlx::query_scalar!(
        "INSERT INTO clusters (cluster_key) VALUES ($1) RETURNING id",
        "cluster-lead-check"
    )
    .fetch_one(&db.pool)
    .await
    .unwrap();
    sqlx::query!(
        "INSERT INTO article_clusters (article_id, cluster_id) VALUES ($1, $2)",
        lead,
        cluster_id
    )
    .execute(&db.pool)
    .await
    .unwrap();
    sqlx::query!(
        "INSERT INTO cluster_scores (cluster_id, lead_article_id, size, score, updated_at) VALUES ($1, $2, 1, 1.0, now())",
        cluster_id,
        lead
    )
    .execute(&db.pool)
    .await
    .unwrap();

    let orphan_lead: i64 = sqlx::query_scalar!(
        r#"
        SELECT count(*) AS "count!"
        FROM cluster_scores cs
        WHERE NOT EXISTS (
            SELECT 1 FROM article_clusters ac
            WHERE ac.cluster_id = cs.cluster_id AND ac.article_id = cs.lead_article_id
        )
        "#
    )
    .fetch_one(&db.pool)
    .await
    .unwrap();
    assert_eq!(orphan_lead, 0);
}

#[tokio::test]
#[serial]
async fn maintenance_leaves_no_empty_clusters_or_scores() {
    let db = TestDatabase::new().await;

    climate_river::services::news_pipeline::clustering::run_maintenance(&db.pool)
        .await
        .expect("maintenance pass");

    let orphan_clusters: i64 = sqlx::query_scalar!(
        r#"
        SELECT count(*) AS "count!"
        FROM clusters c
        WHERE NOT EXISTS (SELECT 1 FROM article_clusters ac WHERE ac.cluster_id = c.id)
        "#
    )
    .fetch_one(&db.pool)
    .await
    .unwrap();
    assert_eq!(orphan_clusters, 0);

    let orphan_scores: i64 = sqlx::query_scalar!(
        r#"
        SELECT count(*) AS "count!"
        FROM cluster_scores cs
        WHERE NOT EXISTS (SELECT 1 FROM article_clusters ac WHERE ac.cluster_id = cs.cluster_id)
        "#
    )
    .fetch_one(&db.pool)
    .await
    .unwrap();
    assert_eq!(orphan_scores, 0);
}

#[tokio::test]
#[serial]
async fn river_query_is_idempotent_with_no_intervening_writes() {
    let db = TestDatabase::new().await;
    let source = db.insert_source("example-news").await;
    let article = db.insert_article(source, "https://example.com/river", "River story").await;

    let cluster_id: i64 = sqlx::query_scalar!(
        "INSERT INTO clusters (cluster_key) VALUES ($1) RETURNING id",
        "cluster-river"
    )
    .fetch_one(&db.pool)
    .await
    .unwrap();
    sqlx::query!(
        "INSERT INTO article_clusters (article_id, cluster_id) VALUES ($1, $2)",
        article,
        cluster_id
    )
    .execute(&db.pool)
    .await
    .unwrap();
    sqlx::query!(
        "INSERT INTO cluster_scores (cluster_id, lead_article_id, size, score, updated_at) VALUES ($1, $2, 1, 1.0, now())",
        cluster_id,
        article
    )
    .execute(&db.pool)
    .await
    .unwrap();

    let query = RiverQuery { view: RiverView::Latest, category: None, window_hours: 168, limit: 10 };

    let first = river(&db.pool, query.clone()).await.unwrap();
    let second = river(&db.pool, query).await.unwrap();

    let first_json = serde_json::to_string(&first).unwrap();
    let second_json = serde_json::to_string(&second).unwrap();
    assert_eq!(first_json, second_json);
}
