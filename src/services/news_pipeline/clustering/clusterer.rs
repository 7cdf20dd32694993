//! Embeds newly-ingested articles and assigns them to story clusters, and
//! runs the periodic maintenance pass (retroactive join, merge, orphan
//! cleanup).

use pgvector::Vector;
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::Result;
use crate::models::cluster::{
    required_strong_pairs, CLUSTER_JOIN_THRESHOLD, CLUSTER_WINDOW_DAYS, MERGE_AVG_THRESHOLD,
    MERGE_PAIR_THRESHOLD,
};
use crate::services::news_pipeline::processing::EmbeddingClient;

#[derive(Debug, Default, Serialize)]
pub struct ClusterResult {
    pub embedded: u32,
    pub joined_existing: u32,
    pub new_clusters: u32,
}

#[derive(Debug, Default, Serialize)]
pub struct MaintenanceResult {
    pub retroactive_joins: u32,
    pub merges: u32,
    pub orphans_deleted: u32,
}

struct UnembeddedArticle {
    id: i64,
    title: String,
    dek: Option<String>,
}

/// Embed and assign up to `limit` articles that have no embedding yet.
pub async fn cluster_new_articles(
    pool: &PgPool,
    embedding_client: &EmbeddingClient,
    limit: u32,
) -> Result<ClusterResult> {
    let rows: Vec<UnembeddedArticle> = sqlx::query_as!(
        UnembeddedArticle,
        r#"
        SELECT id, title, dek
        FROM articles
        WHERE embedding IS NULL
        ORDER BY fetched_at DESC
        LIMIT $1
        "#,
        limit as i64
    )
    .fetch_all(pool)
    .await?;

    let mut result = ClusterResult::default();
    for article in rows {
        let text = match &article.dek {
            Some(dek) if !dek.is_empty() => format!("{} {}", article.title, dek),
            _ => article.title.clone(),
        };
        let embedding = embedding_client.embed(&text).await?;
        let vector = Vector::from(embedding.clone());

        sqlx::query("UPDATE articles SET embedding = $1 WHERE id = $2")
            .bind(&vector)
            .bind(article.id)
            .execute(pool)
            .await?;

        result.embedded += 1;
        if assign_to_cluster(pool, article.id, &vector).await? {
            result.joined_existing += 1;
        } else {
            result.new_clusters += 1;
        }
    }

    Ok(result)
}

/// Find the highest-similarity cluster within the window whose similarity
/// clears the join threshold; join it, or create a singleton cluster.
/// Returns `true` if an existing cluster was joined.
async fn assign_to_cluster(pool: &PgPool, article_id: i64, embedding: &Vector) -> Result<bool> {
    let candidate = sqlx::query_as::<_, (i64, f32)>(
        r#"
        SELECT ac.cluster_id, 1 - (a.embedding <=> $1) AS similarity
        FROM article_clusters ac
        JOIN articles a ON a.id = ac.article_id
        WHERE a.embedding IS NOT NULL
          AND a.published_at > now() - ($2 || ' days')::interval
          AND a.id != $3
        ORDER BY a.embedding <=> $1
        LIMIT 1
        "#,
    )
    .bind(embedding)
    .bind(CLUSTER_WINDOW_DAYS)
    .bind(article_id)
    .fetch_optional(pool)
    .await?;

    if let Some((cluster_id, similarity)) = candidate {
        if similarity >= CLUSTER_JOIN_THRESHOLD {
            sqlx::query("INSERT INTO article_clusters (article_id, cluster_id) VALUES ($1, $2)")
                .bind(article_id)
                .bind(cluster_id)
                .execute(pool)
                .await?;
            return Ok(true);
        }
    }

    let cluster_key = Uuid::new_v4().to_string();
    let cluster_id: i64 = sqlx::query_scalar("INSERT INTO clusters (cluster_key) VALUES ($1) RETURNING id")
        .bind(&cluster_key)
        .fetch_one(pool)
        .await?;
    sqlx::query("INSERT INTO article_clusters (article_id, cluster_id) VALUES ($1, $2)")
        .bind(article_id)
        .bind(cluster_id)
        .execute(pool)
        .await?;

    Ok(false)
}

/// Periodic maintenance: retroactive join of unclustered articles, merge of
/// near-duplicate clusters, and orphan cleanup. Each merge runs in its own
/// transaction so invariant 2 (single cluster membership) never observes a
/// half-moved pair.
pub async fn run_maintenance(pool: &PgPool) -> Result<MaintenanceResult> {
    let mut result = MaintenanceResult::default();

    let unclustered: Vec<(i64, Vector)> = sqlx::query_as(
        r#"
        SELECT a.id, a.embedding
        FROM articles a
        LEFT JOIN article_clusters ac ON ac.article_id = a.id
        WHERE ac.article_id IS NULL
          AND a.embedding IS NOT NULL
          AND a.published_at > now() - ($1 || ' days')::interval
        "#,
    )
    .bind(CLUSTER_WINDOW_DAYS)
    .fetch_all(pool)
    .await?;

    for (article_id, embedding) in unclustered {
        if assign_to_cluster(pool, article_id, &embedding).await? {
            result.retroactive_joins += 1;
        }
    }

    let merge_pairs: Vec<(i64, i64, f64, i64, i64, i64)> = sqlx::query_as(
        r#"
        SELECT a.cluster_id, b.cluster_id, AVG(1 - (ae.embedding <=> be.embedding)),
               COUNT(*) FILTER (WHERE 1 - (ae.embedding <=> be.embedding) >= $1),
               COUNT(DISTINCT a.article_id), COUNT(DISTINCT b.article_id)
        FROM article_clusters a
        JOIN articles ae ON ae.id = a.article_id
        JOIN article_clusters b ON b.cluster_id > a.cluster_id
        JOIN articles be ON be.id = b.article_id
        WHERE ae.embedding IS NOT NULL AND be.embedding IS NOT NULL
        GROUP BY a.cluster_id, b.cluster_id
        HAVING AVG(1 - (ae.embedding <=> be.embedding)) > $2
        ORDER BY AVG(1 - (ae.embedding <=> be.embedding)) DESC
        "#,
    )
    .bind(MERGE_PAIR_THRESHOLD)
    .bind(MERGE_AVG_THRESHOLD)
    .fetch_all(pool)
    .await?;

    for (cluster_a, cluster_b, _avg_similarity, strong_pairs, size_a, size_b) in merge_pairs {
        let required = required_strong_pairs(size_a as usize, size_b as usize);
        if (strong_pairs as usize) < required {
            continue;
        }
        if merge_clusters(pool, cluster_a, cluster_b).await? {
            result.merges += 1;
        }
    }

    result.orphans_deleted = cleanup_orphans(pool).await?;

    Ok(result)
}

/// Merge the smaller cluster into the larger within a single transaction.
async fn merge_clusters(pool: &PgPool, cluster_a: i64, cluster_b: i64) -> Result<bool> {
    let mut tx = pool.begin().await?;

    let size_a: i64 = sqlx::query_scalar("SELECT count(*) FROM article_clusters WHERE cluster_id = $1")
        .bind(cluster_a)
        .fetch_one(&mut *tx)
        .await?;
    let size_b: i64 = sqlx::query_scalar("SELECT count(*) FROM article_clusters WHERE cluster_id = $1")
        .bind(cluster_b)
        .fetch_one(&mut *tx)
        .await?;

    if size_a == 0 || size_b == 0 {
        tx.rollback().await?;
        return Ok(false);
    }

    let (survivor, absorbed) = if size_a >= size_b {
        (cluster_a, cluster_b)
    } else {
        (cluster_b, cluster_a)
    };

    sqlx::query("UPDATE article_clusters SET cluster_id = $1 WHERE cluster_id = $2")
        .bind(survivor)
        .bind(absorbed)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM cluster_scores WHERE cluster_id = $1")
        .bind(absorbed)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM clusters WHERE id = $1")
        .bind(absorbed)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(true)
}

async fn cleanup_orphans(pool: &PgPool) -> Result<u32> {
    let result = sqlx::query(
        r#"
        DELETE FROM clusters
        WHERE id NOT IN (SELECT DISTINCT cluster_id FROM article_clusters)
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        DELETE FROM cluster_scores
        WHERE cluster_id NOT IN (SELECT DISTINCT cluster_id FROM article_clusters)
        "#,
    )
    .execute(pool)
    .await?;

    Ok(result.rows_affected() as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_threshold_matches_contract() {
        assert!((CLUSTER_JOIN_THRESHOLD - 0.6).abs() < f32::EPSILON);
    }

    #[test]
    fn merge_thresholds_match_contract() {
        assert!((MERGE_AVG_THRESHOLD - 0.58).abs() < f32::EPSILON);
        assert!((MERGE_PAIR_THRESHOLD - 0.55).abs() < f32::EPSILON);
    }

    #[test]
    fn singleton_pair_needs_only_one_strong_pair() {
        assert_eq!(required_strong_pairs(1, 1), 1);
    }
}
