//! Clusters group articles describing the same story. `ClusterScore` is the
//! Scorer's authoritative, separately-upserted ranking row.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct Cluster {
    pub id: i64,
    pub cluster_key: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct ArticleCluster {
    pub article_id: i64,
    pub cluster_id: i64,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct ClusterScore {
    pub cluster_id: i64,
    pub lead_article_id: i64,
    pub size: i32,
    pub score: f64,
    pub updated_at: DateTime<Utc>,
}

/// Minimum cosine similarity for an article to join an existing cluster.
pub const CLUSTER_JOIN_THRESHOLD: f32 = 0.6;
/// Window within which cluster membership is (re-)evaluated.
pub const CLUSTER_WINDOW_DAYS: i64 = 7;

/// Average cross-similarity required to consider merging two clusters.
pub const MERGE_AVG_THRESHOLD: f32 = 0.58;
/// Minimum cross-similarity for an individual article pair to count toward
/// the merge's "at least 2 strong pairs" requirement.
pub const MERGE_PAIR_THRESHOLD: f32 = 0.55;
pub const MERGE_MIN_STRONG_PAIRS: usize = 2;

/// The strong-pair requirement scaled down for small clusters: two clusters
/// can never produce more cross-pairs than `size_a * size_b`, so a pair of
/// singletons (capped at 1 possible pair) needs only 1 strong pair, not the
/// flat `MERGE_MIN_STRONG_PAIRS`.
pub fn required_strong_pairs(size_a: usize, size_b: usize) -> usize {
    MERGE_MIN_STRONG_PAIRS.min(size_a * size_b).max(1)
}

/// `score = 0.6 * size + 0.4 * (-delta_hours / 1)`, computed from the
/// cluster's size and hours since its most recently published member.
pub fn compute_score(size: i32, delta_hours: f64) -> f64 {
    0.6 * size as f64 + 0.4 * (-delta_hours)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn score_formula_matches_worked_example() {
        let small_recent = compute_score(3, 1.0);
        let large_stale = compute_score(5, 48.0);
        assert!((small_recent - 1.4).abs() < 1e-9);
        assert!((large_stale - (-16.2)).abs() < 1e-9);
        assert!(small_recent > large_stale);
    }

    #[test]
    fn required_strong_pairs_scales_down_for_singletons() {
        assert_eq!(required_strong_pairs(1, 1), 1);
        assert_eq!(required_strong_pairs(1, 2), 2);
        assert_eq!(required_strong_pairs(3, 5), 2);
    }
}
