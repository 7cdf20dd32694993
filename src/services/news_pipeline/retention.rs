//! Deletes articles that have aged out past the retention window. Runs
//! independently of clustering/scoring; deleting an article cascades to its
//! `article_clusters`/`article_categories` rows, and the maintenance pass's
//! orphan cleanup picks up any cluster left empty as a result.

use serde::Serialize;
use sqlx::PgPool;

use crate::error::Result;

#[derive(Debug, Default, Serialize)]
pub struct RetentionResult {
    pub deleted: u32,
}

/// Deletes articles older than `retention_days`, measured from
/// `coalesce(published_at, fetched_at)` since not every article has a known
/// publish date.
pub async fn cleanup(pool: &PgPool, retention_days: i64) -> Result<RetentionResult> {
    let result = sqlx::query!(
        r#"
        DELETE FROM articles
        WHERE COALESCE(published_at, fetched_at) < now() - ($1 || ' days')::interval
        "#,
        retention_days
    )
    .execute(pool)
    .await?;

    Ok(RetentionResult {
        deleted: result.rows_affected() as u32,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_retention_window_is_sixty_days() {
        assert_eq!(crate::config::PipelineConfig::from_env().retention_days, 60);
    }
}
