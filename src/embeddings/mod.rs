//! Embedding providers

pub mod openai;

use anyhow::Result;

pub use openai::OpenAiEmbedder;

/// Turns text into vectors. Implementations block on network I/O.
pub trait Embedder: Send + Sync {
    /// One vector per input, in input order
    fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    fn embed_query(&self, text: &str) -> Result<Vec<f32>>;
}
