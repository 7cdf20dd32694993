//! Computes `cluster_scores.score` for every cluster with at least one
//! article in the scoring window. `size` counts the cluster's full
//! membership, not just the in-window articles that made it eligible for
//! scoring. The maintenance pass must never overwrite what this module
//! writes.

use serde::Serialize;
use sqlx::PgPool;

use crate::error::Result;
use crate::models::cluster::compute_score;

const DEFAULT_SCORING_WINDOW_DAYS: i64 = 7;

#[derive(Debug, Default, Serialize)]
pub struct ScoreResult {
    pub clusters_scored: u32,
}

struct ClusterWindow {
    cluster_id: i64,
    size: i32,
    lead_article_id: i64,
    hours_since_latest: f64,
}

pub async fn score_clusters(pool: &PgPool) -> Result<ScoreResult> {
    let clusters: Vec<ClusterWindow> = sqlx::query_as!(
        ClusterWindow,
        r#"
        SELECT
            ac.cluster_id AS "cluster_id!",
            COUNT(*)::int AS "size!",
            (ARRAY_AGG(a.id ORDER BY a.published_at DESC NULLS LAST, a.id DESC))[1] AS "lead_article_id!",
            EXTRACT(EPOCH FROM (now() - MAX(a.published_at))) / 3600.0 AS "hours_since_latest!"
        FROM article_clusters ac
        JOIN articles a ON a.id = ac.article_id
        WHERE ac.cluster_id IN (
            SELECT ac2.cluster_id
            FROM article_clusters ac2
            JOIN articles a2 ON a2.id = ac2.article_id
            WHERE a2.published_at > now() - ($1 || ' days')::interval
        )
        GROUP BY ac.cluster_id
        "#,
        DEFAULT_SCORING_WINDOW_DAYS
    )
    .fetch_all(pool)
    .await?;

    let mut result = ScoreResult::default();
    for cluster in clusters {
        let score = compute_score(cluster.size, cluster.hours_since_latest);

        sqlx::query!(
            r#"
            INSERT INTO cluster_scores (cluster_id, lead_article_id, size, score, updated_at)
            VALUES ($1, $2, $3, $4, now())
            ON CONFLICT (cluster_id) DO UPDATE SET
                lead_article_id = EXCLUDED.lead_article_id,
                size = EXCLUDED.size,
                score = EXCLUDED.score,
                updated_at = now()
            "#,
            cluster.cluster_id,
            cluster.lead_article_id,
            cluster.size,
            score,
        )
        .execute(pool)
        .await?;

        result.clusters_scored += 1;
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_window_matches_contract() {
        assert_eq!(DEFAULT_SCORING_WINDOW_DAYS, 7);
    }
}
