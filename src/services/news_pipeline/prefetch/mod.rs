//! Content Prefetcher: retrieves and extracts full article bodies.

pub mod content_prefetcher;

pub use content_prefetcher::{prefetch, select_pending, PrefetchOutcome, PrefetchResult};
