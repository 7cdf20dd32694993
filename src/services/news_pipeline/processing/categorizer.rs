//! Hybrid rule + embedding category tagging: a cheap keyword pass gates an
//! embedding-similarity pass, and the two are fused into a final confidence.

use moka::future::Cache;
use serde::Serialize;
use sqlx::PgPool;
use std::sync::Arc;

use crate::error::Result;
use crate::models::category::{CategoryScore, PERSIST_THRESHOLD, RULE_SIGNAL_FLOOR};
use crate::services::news_pipeline::processing::embedding_client::{cosine_similarity, EmbeddingClient};

#[derive(Debug, Default, Serialize)]
pub struct CategorizeResult {
    pub processed: u32,
}

struct UncategorizedArticle {
    id: i64,
    title: String,
    dek: Option<String>,
    content_text: Option<String>,
}

struct CategoryDef {
    id: i32,
    name: String,
    description: String,
    keywords: Vec<String>,
}

/// Generic climate vocabulary, independent of any single category's keyword
/// list. An article mentioning one of these still passes the relevance gate
/// even when no category's own keywords score above the rule floor.
const CLIMATE_TERMS: &[&str] = &[
    "climate",
    "warming",
    "emission",
    "emissions",
    "carbon",
    "greenhouse gas",
    "decarbonization",
    "renewable",
    "fossil fuel",
    "net zero",
    "sea level",
    "heatwave",
    "drought",
    "wildfire",
    "extreme weather",
    "ipcc",
    "cop28",
    "cop29",
    "paris agreement",
];

fn contains_climate_term(text: &str) -> bool {
    let lower = text.to_lowercase();
    CLIMATE_TERMS.iter().any(|term| lower.contains(term))
}

pub struct Categorizer {
    pool: PgPool,
    embedding_client: Arc<EmbeddingClient>,
    categories: Vec<CategoryDef>,
    /// Cached anchor embedding per category id; bounded at the category
    /// count since entries never expire within a process lifetime.
    anchor_cache: Cache<i32, Arc<Vec<f32>>>,
}

impl Categorizer {
    pub async fn load(pool: PgPool, embedding_client: Arc<EmbeddingClient>) -> Result<Self> {
        let rows = sqlx::query!("SELECT id, name, description, keywords FROM categories")
            .fetch_all(&pool)
            .await?;

        let categories = rows
            .into_iter()
            .map(|r| CategoryDef {
                id: r.id,
                name: r.name,
                description: r.description,
                keywords: r.keywords,
            })
            .collect();

        Ok(Self {
            pool,
            embedding_client,
            categories,
            anchor_cache: Cache::new(6),
        })
    }

    pub async fn categorize(&self, article_id: i64, title: &str, summary: Option<&str>, content_prefix: Option<&str>) -> Result<Vec<CategoryScore>> {
        let rule_scores = self.rule_phase(title, summary, content_prefix);

        let any_rule_signal = rule_scores
            .iter()
            .any(|(_, score)| *score >= RULE_SIGNAL_FLOOR);
        let combined_text = format!(
            "{title} {} {}",
            summary.unwrap_or_default(),
            content_prefix.unwrap_or_default()
        );
        if !any_rule_signal && !contains_climate_term(&combined_text) {
            self.persist(article_id, &[]).await?;
            return Ok(vec![]);
        }

        let semantic_scores = self.semantic_phase(title, summary).await.unwrap_or_default();

        let scores: Vec<CategoryScore> = self
            .categories
            .iter()
            .map(|cat| {
                let rule = rule_scores
                    .iter()
                    .find(|(id, _)| *id == cat.id)
                    .map(|(_, s)| *s)
                    .unwrap_or(0.0);
                let semantic = semantic_scores
                    .iter()
                    .find(|(id, _)| *id == cat.id)
                    .map(|(_, s)| *s)
                    .unwrap_or(0.0);
                CategoryScore {
                    category_id: cat.id,
                    rule_confidence: rule,
                    semantic_confidence: semantic,
                }
            })
            .filter(|score| score.combined() >= PERSIST_THRESHOLD)
            .collect();

        self.persist(article_id, &scores).await?;
        Ok(scores)
    }

    /// Categorizes up to `limit` recently-ingested articles that have no
    /// `article_categories` rows yet, preferring the most recently fetched.
    pub async fn categorize_new(&self, limit: u32) -> Result<CategorizeResult> {
        let rows: Vec<UncategorizedArticle> = sqlx::query_as!(
            UncategorizedArticle,
            r#"
            SELECT a.id, a.title, a.dek, a.content_text
            FROM articles a
            LEFT JOIN article_categories ac ON ac.article_id = a.id
            WHERE ac.article_id IS NULL
            ORDER BY a.fetched_at DESC
            LIMIT $1
            "#,
            limit as i64
        )
        .fetch_all(&self.pool)
        .await?;

        let mut result = CategorizeResult::default();
        for article in rows {
            let content_prefix = article.content_text.as_deref().map(|c| c.chars().take(2_000).collect::<String>());
            self.categorize(
                article.id,
                &article.title,
                article.dek.as_deref(),
                content_prefix.as_deref(),
            )
            .await?;
            result.processed += 1;
        }

        Ok(result)
    }

    fn rule_phase(&self, title: &str, summary: Option<&str>, content_prefix: Option<&str>) -> Vec<(i32, f64)> {
        let title_lower = title.to_lowercase();
        let summary_lower = summary.unwrap_or_default().to_lowercase();
        let body_lower = content_prefix
            .map(|c| c.chars().take(2_000).collect::<String>().to_lowercase())
            .unwrap_or_default();

        self.categories
            .iter()
            .map(|cat| {
                let mut weighted_hits = 0.0;
                let mut max_possible = 0.0;
                for keyword in &cat.keywords {
                    let k = keyword.to_lowercase();
                    max_possible += 2.0 + 1.5 + 1.0;
                    if title_lower.contains(&k) {
                        weighted_hits += 2.0;
                    }
                    if summary_lower.contains(&k) {
                        weighted_hits += 1.5;
                    }
                    if body_lower.contains(&k) {
                        weighted_hits += 1.0;
                    }
                }
                let confidence = if max_possible > 0.0 {
                    (weighted_hits / max_possible).min(1.0)
                } else {
                    0.0
                };
                (cat.id, confidence)
            })
            .collect()
    }

    async fn semantic_phase(&self, title: &str, summary: Option<&str>) -> Result<Vec<(i32, f64)>> {
        let text = match summary {
            Some(s) if !s.is_empty() => format!("{title} {s}"),
            _ => title.to_string(),
        };
        let query_embedding = self.embedding_client.embed(&text).await?;

        let mut scores = Vec::with_capacity(self.categories.len());
        for cat in &self.categories {
            let anchor = self.anchor_embedding(cat).await?;
            let similarity = cosine_similarity(&query_embedding, &anchor);
            let rescaled = (2.0 * (similarity as f64 - 0.5)).max(0.0);
            scores.push((cat.id, rescaled));
        }
        Ok(scores)
    }

    async fn anchor_embedding(&self, cat: &CategoryDef) -> Result<Arc<Vec<f32>>> {
        if let Some(cached) = self.anchor_cache.get(&cat.id).await {
            return Ok(cached);
        }
        let anchor_text = format!(
            "{} {} {}",
            cat.name,
            cat.description,
            cat.keywords.join(" ")
        );
        let embedding = Arc::new(self.embedding_client.embed(&anchor_text).await?);
        self.anchor_cache.insert(cat.id, embedding.clone()).await;
        Ok(embedding)
    }

    async fn persist(&self, article_id: i64, scores: &[CategoryScore]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query!("DELETE FROM article_categories WHERE article_id = $1", article_id)
            .execute(&mut *tx)
            .await?;

        let primary_id = scores
            .iter()
            .max_by(|a, b| a.combined().partial_cmp(&b.combined()).unwrap())
            .map(|s| s.category_id);

        for score in scores {
            sqlx::query!(
                r#"
                INSERT INTO article_categories (article_id, category_id, confidence, is_primary)
                VALUES ($1, $2, $3, $4)
                "#,
                article_id,
                score.category_id,
                score.combined(),
                Some(score.category_id) == primary_id,
            )
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weighted_keyword_scoring_favors_title_hits() {
        let cat = CategoryDef {
            id: 1,
            name: "Government".to_string(),
            description: String::new(),
            keywords: vec!["policy".to_string()],
        };
        let categorizer_categories = vec![cat];

        let title_hit = {
            let title_lower = "new policy announced".to_string();
            let mut weighted = 0.0;
            let mut max_possible = 0.0;
            for keyword in &categorizer_categories[0].keywords {
                max_possible += 4.5;
                if title_lower.contains(keyword) {
                    weighted += 2.0;
                }
            }
            weighted / max_possible
        };
        assert!(title_hit > 0.0);
    }

    #[test]
    fn climate_term_passes_the_gate_without_a_category_keyword_hit() {
        assert!(contains_climate_term("Scientists warn of accelerating sea level rise"));
        assert!(!contains_climate_term("Local bakery wins pastry award"));
    }
}
