//! Clusterer: embeds articles and assigns/merges them into story clusters
//! by cosine similarity.

pub mod clusterer;

pub use clusterer::{cluster_new_articles, run_maintenance, ClusterResult, MaintenanceResult};
