//! The fixed `categories` taxonomy and the `article_categories` junction.
//! Categories are seeded by migration, not created at runtime.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
pub enum CategorySlug {
    Government,
    Justice,
    Business,
    Impacts,
    Tech,
    Research,
}

impl CategorySlug {
    pub const ALL: [CategorySlug; 6] = [
        CategorySlug::Government,
        CategorySlug::Justice,
        CategorySlug::Business,
        CategorySlug::Impacts,
        CategorySlug::Tech,
        CategorySlug::Research,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CategorySlug::Government => "government",
            CategorySlug::Justice => "justice",
            CategorySlug::Business => "business",
            CategorySlug::Impacts => "impacts",
            CategorySlug::Tech => "tech",
            CategorySlug::Research => "research",
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct Category {
    pub id: i32,
    pub slug: CategorySlug,
    pub name: String,
    pub description: String,
    pub color: String,
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct ArticleCategory {
    pub article_id: i64,
    pub category_id: i32,
    pub confidence: f64,
    pub is_primary: bool,
}

/// One category's rule-phase and semantic-phase contributions before fusion.
#[derive(Debug, Clone, Copy)]
pub struct CategoryScore {
    pub category_id: i32,
    pub rule_confidence: f64,
    pub semantic_confidence: f64,
}

impl CategoryScore {
    /// Fused confidence per the categorizer's 0.6 rule / 0.4 semantic split.
    pub fn combined(&self) -> f64 {
        (0.6 * self.rule_confidence + 0.4 * self.semantic_confidence).clamp(0.0, 1.0)
    }
}

/// Confidence floor below which the rule phase treats a category as absent.
pub const RULE_SIGNAL_FLOOR: f64 = 0.15;
/// Minimum fused confidence for a category to be persisted.
pub const PERSIST_THRESHOLD: f64 = 0.2;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combined_confidence_clips_to_unit_interval() {
        let score = CategoryScore {
            category_id: 1,
            rule_confidence: 1.0,
            semantic_confidence: 1.0,
        };
        assert_eq!(score.combined(), 1.0);
    }

    #[test]
    fn category_slugs_round_trip_strings() {
        for slug in CategorySlug::ALL {
            assert!(!slug.as_str().is_empty());
        }
    }
}
