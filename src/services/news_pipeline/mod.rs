//! News Pipeline
//!
//! The climate-news aggregation core: discovery, ingestion, content
//! prefetch, categorization, clustering, scoring, the river query, and
//! headline rewriting, composed by the Scheduler driver in `orchestrator`.

pub mod clustering;
pub mod discovery;
pub mod host_normalize;
pub mod ingestion;
pub mod orchestrator;
pub mod prefetch;
pub mod processing;
pub mod retention;
pub mod rewriter;
pub mod river;
pub mod scoring;

pub use clustering::{ClusterResult, MaintenanceResult};
pub use discovery::{FeedDiscoveryResult, WebDiscoveryResult};
pub use ingestion::IngestResult;
pub use orchestrator::{run_cron, CronEndpoint, CronRequest, CronResponse, StageResult};
pub use prefetch::PrefetchResult;
pub use processing::{CategorizeResult, Categorizer, ChatClient, EmbeddingClient};
pub use retention::RetentionResult;
pub use rewriter::RewriteResult;
pub use river::river;
pub use scoring::ScoreResult;
