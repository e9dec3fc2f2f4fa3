use std::sync::Arc;

use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::chat::{ChatPipeline, DEFAULT_THREAD, LanceRetriever};
use crate::config::{Config, ConfigError};
use crate::database::lancedb::VectorStore;
use crate::database::sqlite::Database;
use crate::database::sqlite::models::IndexBuild;
use crate::embeddings::{Embedder, OpenAiEmbedder};
use crate::indexer::{IndexReport, Indexer};
use crate::llm::{ChatMessage, ChatModel, OpenAiChatModel};
use crate::symbols::Symbol;
use crate::symbols::store::{self, load_symbols};
use crate::{RepoChatError, Result};

const RECENT_BUILDS: i64 = 5;

/// Index and collection state shown by `status`
#[derive(Debug, Clone, Serialize)]
pub struct IndexStatus {
    pub collection: String,
    pub latest_build: Option<IndexBuild>,
    pub recent_builds: Vec<IndexBuild>,
    pub embedding_count: u64,
    pub symbol_count: usize,
}

/// Application entry point: owns the stores, providers and conversation
/// memory for one data directory
pub struct RepoChat {
    config: Config,
    database: Database,
    vector_store: Arc<RwLock<VectorStore>>,
    indexer: Indexer,
    pipeline: ChatPipeline,
}

impl RepoChat {
    /// Open the data directory with the configured OpenAI-compatible
    /// providers. Without an API key, provider calls fail but local
    /// operations still work.
    #[inline]
    pub async fn new(config: Config) -> Result<Self> {
        let (embedder, model): (Arc<dyn Embedder>, Arc<dyn ChatModel>) =
            match config.provider.require_api_key() {
                Ok(_) => (
                    Arc::new(OpenAiEmbedder::new(&config.provider)?),
                    Arc::new(OpenAiChatModel::new(&config.provider)?),
                ),
                Err(e) => {
                    warn!("{}", e);
                    (Arc::new(MissingCredentials), Arc::new(MissingCredentials))
                }
            };
        Self::with_providers(config, embedder, model).await
    }

    #[inline]
    pub async fn with_providers(
        config: Config,
        embedder: Arc<dyn Embedder>,
        model: Arc<dyn ChatModel>,
    ) -> Result<Self> {
        let database = Database::initialize_from_config_dir(config.get_base_dir())
            .await
            .map_err(|e| RepoChatError::Database(format!("{e:#}")))?;
        let vector_store = Arc::new(RwLock::new(VectorStore::new(&config).await?));

        let indexer = Indexer::new(
            config.clone(),
            database.clone(),
            Arc::clone(&vector_store),
            Arc::clone(&embedder),
        );
        let retriever = LanceRetriever::new(
            database.clone(),
            Arc::clone(&vector_store),
            embedder,
            config.index.collection.clone(),
        );
        let pipeline = ChatPipeline::new(Arc::new(retriever), model, config.chat.clone());

        debug!("Opened repo-chat data directory {}", config.get_base_dir().display());
        Ok(Self {
            config,
            database,
            vector_store,
            indexer,
            pipeline,
        })
    }

    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Index `url`, or the configured default repository when `None`
    #[inline]
    pub async fn build_index(&self, url: Option<&str>) -> Result<IndexReport> {
        let url = url
            .or(self.config.index.default_repository.as_deref())
            .ok_or_else(|| {
                RepoChatError::Config(
                    "No repository URL given and index.default_repository is not set".to_string(),
                )
            })?;
        self.indexer.build_index(url).await
    }

    #[inline]
    pub async fn ask(&self, question: &str, thread_id: Option<&str>) -> Result<String> {
        self.pipeline
            .ask(question, thread_id.unwrap_or(DEFAULT_THREAD))
            .await
    }

    #[inline]
    pub async fn get_summary(&self, thread_id: Option<&str>) -> Result<String> {
        self.pipeline
            .get_summary(thread_id.unwrap_or(DEFAULT_THREAD))
            .await
    }

    /// Forget a conversation; returns whether the thread existed
    #[inline]
    pub async fn reset_chat(&self, thread_id: Option<&str>) -> bool {
        self.pipeline.reset(thread_id.unwrap_or(DEFAULT_THREAD)).await
    }

    /// Top-level modules of the last successful build
    #[inline]
    pub fn list_modules(&self) -> Result<Vec<String>> {
        let symbols = load_symbols(&self.config.symbols_path())?;
        Ok(store::list_modules(&symbols))
    }

    #[inline]
    pub fn list_symbols(&self, module: &str) -> Result<Vec<Symbol>> {
        let symbols = load_symbols(&self.config.symbols_path())?;
        Ok(store::list_symbols(&symbols, module)
            .into_iter()
            .cloned()
            .collect())
    }

    #[inline]
    pub async fn status(&self) -> Result<IndexStatus> {
        let collection = self.config.index.collection.clone();
        let latest_build = self
            .database
            .latest_completed_build(&collection)
            .await
            .map_err(|e| RepoChatError::Database(format!("{e:#}")))?;
        let recent_builds = self
            .database
            .recent_builds(RECENT_BUILDS)
            .await
            .map_err(|e| RepoChatError::Database(format!("{e:#}")))?;
        let embedding_count = self.vector_store.read().await.count_embeddings().await?;
        let symbol_count = load_symbols(&self.config.symbols_path())?.len();

        Ok(IndexStatus {
            collection,
            latest_build,
            recent_builds,
            embedding_count,
            symbol_count,
        })
    }
}

/// Stands in for both providers when no API key is configured
struct MissingCredentials;

impl Embedder for MissingCredentials {
    fn embed_documents(&self, _texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        Err(ConfigError::MissingApiKey.into())
    }

    fn embed_query(&self, _text: &str) -> anyhow::Result<Vec<f32>> {
        Err(ConfigError::MissingApiKey.into())
    }
}

impl ChatModel for MissingCredentials {
    fn complete(&self, _messages: &[ChatMessage]) -> anyhow::Result<String> {
        Err(ConfigError::MissingApiKey.into())
    }
}
