//! Response shapes the river query assembles for the presentation layer.
//! Nothing here is persisted; these are read-side view models only.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::models::ContentStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiverView {
    Top,
    Latest,
}

impl RiverView {
    pub fn is_latest(&self) -> bool {
        matches!(self, RiverView::Latest)
    }
}

/// Up to 8 non-lead outlets carrying the same story, one per normalized host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiverSubArticle {
    pub article_id: i64,
    pub title: String,
    pub url: String,
    pub source_name: Option<String>,
    pub author: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub host: String,
    pub article_count: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiverClusterRow {
    pub cluster_id: i64,
    pub score: f64,
    pub sources_count: i32,

    pub lead_article_id: i64,
    pub lead_title: String,
    pub lead_url: String,
    pub lead_dek: Option<String>,
    pub lead_author: Option<String>,
    pub lead_source_name: Option<String>,
    pub lead_homepage: Option<String>,
    pub lead_published_at: Option<DateTime<Utc>>,
    pub lead_content_status: Option<ContentStatus>,
    pub lead_content_word_count: Option<i32>,

    pub subs: Vec<RiverSubArticle>,
    pub all_articles_by_source: HashMap<String, Vec<RiverSubArticle>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiverQuery {
    pub view: RiverView,
    pub category: Option<String>,
    pub window_hours: i64,
    pub limit: i64,
}

impl Default for RiverQuery {
    fn default() -> Self {
        Self {
            view: RiverView::Top,
            category: None,
            window_hours: 168,
            limit: 10,
        }
    }
}

/// Maximum non-lead outlets surfaced per cluster in the river view.
pub const MAX_SUBS: usize = 8;
