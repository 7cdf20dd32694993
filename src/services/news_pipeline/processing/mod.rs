//! Embedding generation, chat completion, and category tagging.

pub mod categorizer;
pub mod chat_client;
pub mod embedding_client;

pub use categorizer::{CategorizeResult, Categorizer};
pub use chat_client::ChatClient;
pub use embedding_client::{cosine_similarity, EmbeddingClient, EMBEDDING_DIMENSION};
