//! Rewriter: batch rewrite of cluster-lead headlines via chat completion.

pub mod rewriter;

pub use rewriter::{rewrite, RewriteResult};
