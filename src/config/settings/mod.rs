#[cfg(test)]
mod tests;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::ingest::chunking::ChunkingConfig;

pub const FALLBACK_ANSWER: &str = "I couldn’t find this information in the repository.";

const HOME_ENV: &str = "REPO_CHAT_HOME";
const API_KEY_ENV: &str = "OPENAI_API_KEY";
const BASE_URL_ENV: &str = "OPENAI_BASE_URL";
const CHAT_MODEL_ENV: &str = "LLM_MODEL";
const EMBEDDING_MODEL_ENV: &str = "EMBEDDING_MODEL";
const COLLECTION_ENV: &str = "REPO_CHAT_COLLECTION";
const REPO_URL_ENV: &str = "REPO_CHAT_REPO_URL";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(skip)]
    pub base_dir: PathBuf,
}

/// Settings for the OpenAI-compatible embedding and chat endpoints
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProviderConfig {
    pub base_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub chat_model: String,
    pub embedding_model: String,
    pub batch_size: u32,
    pub timeout_seconds: u64,
    pub retry_attempts: u32,
    pub temperature: f32,
}

impl Default for ProviderConfig {
    #[inline]
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: None,
            chat_model: "gpt-4o-mini".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            batch_size: 64,
            timeout_seconds: 60,
            retry_attempts: 3,
            temperature: 0.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct IndexConfig {
    /// Name of the LanceDB table holding the repository vectors
    pub collection: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_repository: Option<String>,
    /// Clone depth, 0 fetches the full history
    pub clone_depth: u32,
    pub code_extensions: Vec<String>,
    pub doc_extensions: Vec<String>,
    /// Exact file names indexed as code whatever their extension
    pub file_names: Vec<String>,
}

impl Default for IndexConfig {
    #[inline]
    fn default() -> Self {
        Self {
            collection: "repo_index".to_string(),
            default_repository: None,
            clone_depth: 1,
            code_extensions: vec!["py".to_string()],
            doc_extensions: vec!["md".to_string()],
            file_names: vec!["requirements.txt".to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ChatConfig {
    /// Number of chunks retrieved per question
    pub top_k: usize,
    /// Number of previous turns replayed to the chat model
    pub history_turns: usize,
    /// Turns kept per thread before the oldest are dropped
    pub max_turns: usize,
    pub max_threads: usize,
    pub thread_ttl_seconds: u64,
    pub fallback_answer: String,
}

impl Default for ChatConfig {
    #[inline]
    fn default() -> Self {
        Self {
            top_k: 10,
            history_turns: 6,
            max_turns: 50,
            max_threads: 256,
            thread_ttl_seconds: 3600,
            fallback_answer: FALLBACK_ANSWER.to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration directory not found or could not be created")]
    DirectoryError,
    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),
    #[error("Invalid protocol: {0} (must be 'http' or 'https')")]
    InvalidProtocol(String),
    #[error("Missing API key: set OPENAI_API_KEY or provider.api_key")]
    MissingApiKey,
    #[error("Invalid model name: {0} (cannot be empty)")]
    InvalidModel(String),
    #[error("Invalid batch size: {0} (must be between 1 and 2048)")]
    InvalidBatchSize(u32),
    #[error("Invalid timeout: {0} (must be between 1 and 600 seconds)")]
    InvalidTimeout(u64),
    #[error("Invalid retry attempts: {0} (must be between 1 and 10)")]
    InvalidRetryAttempts(u32),
    #[error("Invalid temperature: {0} (must be between 0.0 and 2.0)")]
    InvalidTemperature(f32),
    #[error("Invalid collection name: {0:?} (letters, digits, '_' and '-' only)")]
    InvalidCollection(String),
    #[error("No file extensions or file names configured for indexing")]
    NoExtensions,
    #[error("Invalid chunk size: {0} (must be between 100 and 8000)")]
    InvalidChunkSize(usize),
    #[error("Chunk overlap ({0}) must be smaller than chunk size ({1})")]
    OverlapTooLarge(usize, usize),
    #[error("Invalid top_k: {0} (must be between 1 and 100)")]
    InvalidTopK(usize),
    #[error("History turns ({0}) cannot exceed max turns ({1})")]
    HistoryTooLong(usize, usize),
    #[error("Invalid thread limits: max_threads and max_turns must be at least 1")]
    InvalidThreadLimits,
    #[error("Fallback answer cannot be empty")]
    EmptyFallback,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl Config {
    /// Load `config.toml` from `config_dir`, falling back to defaults, then apply
    /// environment overrides
    #[inline]
    pub fn load<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let config_dir = config_dir.as_ref();
        let mut config = match Self::load_file(config_dir)? {
            Some(config) => config,
            None => {
                debug!(
                    "No config file at {}, using defaults",
                    config_dir.join("config.toml").display()
                );
                Config {
                    base_dir: config_dir.to_path_buf(),
                    ..Config::default()
                }
            }
        };
        config.apply_env_overrides();

        config
            .validate()
            .with_context(|| "Configuration validation failed")?;

        Ok(config)
    }

    /// Read `config.toml` exactly as stored: no environment overrides and no
    /// validation. `None` when the file does not exist.
    #[inline]
    pub fn load_file<P: AsRef<Path>>(config_dir: P) -> Result<Option<Self>> {
        let config_path = config_dir.as_ref().join("config.toml");
        if !config_path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;
        let mut config = toml::from_str::<Config>(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;
        config.base_dir = config_dir.as_ref().to_path_buf();

        Ok(Some(config))
    }

    /// Load from the default data directory
    #[inline]
    pub fn load_default() -> Result<Self> {
        let dir = Self::config_dir()?;
        Self::load(dir)
    }

    /// Resolve the data directory: `$REPO_CHAT_HOME` or `~/.repo-chat`
    #[inline]
    pub fn config_dir() -> Result<PathBuf, ConfigError> {
        if let Some(home) = env::var_os(HOME_ENV).filter(|v| !v.is_empty()) {
            return Ok(PathBuf::from(home));
        }
        dirs::home_dir()
            .map(|home| home.join(".repo-chat"))
            .ok_or(ConfigError::DirectoryError)
    }

    #[inline]
    pub fn apply_env_overrides(&mut self) {
        if let Some(key) = non_empty_env(API_KEY_ENV) {
            self.provider.api_key = Some(key);
        }
        if let Some(url) = non_empty_env(BASE_URL_ENV) {
            self.provider.base_url = url;
        }
        if let Some(model) = non_empty_env(CHAT_MODEL_ENV) {
            self.provider.chat_model = model;
        }
        if let Some(model) = non_empty_env(EMBEDDING_MODEL_ENV) {
            self.provider.embedding_model = model;
        }
        if let Some(collection) = non_empty_env(COLLECTION_ENV) {
            self.index.collection = collection;
        }
        if let Some(url) = non_empty_env(REPO_URL_ENV) {
            self.index.default_repository = Some(url);
        }
    }

    #[inline]
    pub fn save(&self) -> Result<()> {
        self.validate()
            .context("Configuration validation failed before saving")?;

        let config_dir = self.get_base_dir();

        fs::create_dir_all(config_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                config_dir.display()
            )
        })?;

        let config_path = self.config_file_path();
        let content = toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

        Ok(())
    }

    /// Get the base directory for the application
    #[inline]
    pub fn get_base_dir(&self) -> &Path {
        &self.base_dir
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.provider.validate()?;
        self.index.validate()?;
        self.chunking.validate()?;
        self.chat.validate()?;
        Ok(())
    }

    #[inline]
    pub fn config_file_path(&self) -> PathBuf {
        self.get_base_dir().join("config.toml")
    }

    /// Get the path for the SQLite database
    #[inline]
    pub fn database_path(&self) -> PathBuf {
        self.get_base_dir().join("metadata.db")
    }

    /// Get the path for the vector database directory
    #[inline]
    pub fn vector_database_path(&self) -> PathBuf {
        self.get_base_dir().join("vectors")
    }

    #[inline]
    pub fn symbols_path(&self) -> PathBuf {
        self.get_base_dir().join("symbols.json")
    }

    /// Working copy of the indexed repository, replaced on every build
    #[inline]
    pub fn repository_path(&self) -> PathBuf {
        self.get_base_dir().join("repo")
    }

    #[inline]
    pub fn lock_file_path(&self) -> PathBuf {
        self.get_base_dir().join(".index.lock")
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl ProviderConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.base_url()?;

        if self.chat_model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.chat_model.clone()));
        }

        if self.embedding_model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.embedding_model.clone()));
        }

        if self.batch_size == 0 || self.batch_size > 2048 {
            return Err(ConfigError::InvalidBatchSize(self.batch_size));
        }

        if !(1..=600).contains(&self.timeout_seconds) {
            return Err(ConfigError::InvalidTimeout(self.timeout_seconds));
        }

        if !(1..=10).contains(&self.retry_attempts) {
            return Err(ConfigError::InvalidRetryAttempts(self.retry_attempts));
        }

        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::InvalidTemperature(self.temperature));
        }

        Ok(())
    }

    /// Parsed API base URL, guaranteed to end with a slash so `join` appends
    #[inline]
    pub fn base_url(&self) -> Result<Url, ConfigError> {
        let mut raw = self.base_url.trim().to_string();
        if !raw.ends_with('/') {
            raw.push('/');
        }
        let url = Url::parse(&raw).map_err(|_| ConfigError::InvalidUrl(self.base_url.clone()))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ConfigError::InvalidProtocol(url.scheme().to_string()));
        }
        Ok(url)
    }

    #[inline]
    pub fn require_api_key(&self) -> Result<&str, ConfigError> {
        self.api_key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
            .ok_or(ConfigError::MissingApiKey)
    }

    #[inline]
    pub fn set_base_url(&mut self, base_url: String) -> Result<(), ConfigError> {
        let temp_config = ProviderConfig {
            base_url: base_url.clone(),
            ..self.clone()
        };
        temp_config.base_url()?;
        self.base_url = base_url;
        Ok(())
    }

    #[inline]
    pub fn set_chat_model(&mut self, model: String) -> Result<(), ConfigError> {
        if model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(model));
        }
        self.chat_model = model;
        Ok(())
    }

    #[inline]
    pub fn set_embedding_model(&mut self, model: String) -> Result<(), ConfigError> {
        if model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(model));
        }
        self.embedding_model = model;
        Ok(())
    }

    #[inline]
    pub fn set_batch_size(&mut self, batch_size: u32) -> Result<(), ConfigError> {
        if batch_size == 0 || batch_size > 2048 {
            return Err(ConfigError::InvalidBatchSize(batch_size));
        }
        self.batch_size = batch_size;
        Ok(())
    }
}

impl IndexConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_collection(&self.collection)?;

        if self.code_extensions.is_empty()
            && self.doc_extensions.is_empty()
            && self.file_names.is_empty()
        {
            return Err(ConfigError::NoExtensions);
        }

        Ok(())
    }

    #[inline]
    pub fn set_collection(&mut self, collection: String) -> Result<(), ConfigError> {
        validate_collection(&collection)?;
        self.collection = collection;
        Ok(())
    }
}

fn validate_collection(name: &str) -> Result<(), ConfigError> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(ConfigError::InvalidCollection(name.to_string()))
    }
}

impl ChunkingConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (size, overlap) in [
            (self.code_chunk_size, self.code_chunk_overlap),
            (self.prose_chunk_size, self.prose_chunk_overlap),
        ] {
            if !(100..=8000).contains(&size) {
                return Err(ConfigError::InvalidChunkSize(size));
            }
            if overlap >= size {
                return Err(ConfigError::OverlapTooLarge(overlap, size));
            }
        }
        Ok(())
    }
}

impl ChatConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=100).contains(&self.top_k) {
            return Err(ConfigError::InvalidTopK(self.top_k));
        }

        if self.max_threads == 0 || self.max_turns == 0 {
            return Err(ConfigError::InvalidThreadLimits);
        }

        if self.history_turns > self.max_turns {
            return Err(ConfigError::HistoryTooLong(
                self.history_turns,
                self.max_turns,
            ));
        }

        if self.fallback_answer.trim().is_empty() {
            return Err(ConfigError::EmptyFallback);
        }

        Ok(())
    }

    #[inline]
    pub fn set_top_k(&mut self, top_k: usize) -> Result<(), ConfigError> {
        if !(1..=100).contains(&top_k) {
            return Err(ConfigError::InvalidTopK(top_k));
        }
        self.top_k = top_k;
        Ok(())
    }
}
