//! Ingestor: fetches feed sources, resolves canonical URLs, and upserts
//! `articles` rows.

pub mod feed_fetcher;

pub use feed_fetcher::{backfill, ingest, IngestResult};
