use thiserror::Error;

pub type Result<T> = std::result::Result<T, RepoChatError>;

#[derive(Error, Debug)]
pub enum RepoChatError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Repository unavailable: {url}: {message}")]
    RepositoryUnavailable { url: String, message: String },

    #[error(transparent)]
    Parse(#[from] symbols::ParseError),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Generation failed: {0}")]
    Generation(String),

    #[error("No index has been built yet; run `repo-chat index <url>` first")]
    EmptyIndex,

    #[error("Another index build is already running (lock: {0})")]
    IndexBusy(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub mod chat;
pub mod commands;
pub mod config;
pub mod context;
pub mod database;
pub mod embeddings;
pub mod http;
pub mod indexer;
pub mod ingest;
pub mod llm;
pub mod repository;
pub mod symbols;
