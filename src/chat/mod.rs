//! Retrieval-augmented question answering over the indexed repository.
//!
//! A question is answered by retrieving the nearest chunks, rendering them as
//! context and asking the chat model to answer from that context only. Prior
//! turns of the same thread are sent along as conversation history.

pub mod memory;


use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::config::ChatConfig;
use crate::database::lancedb::VectorStore;
use crate::database::sqlite::Database;
use crate::embeddings::Embedder;
use crate::ingest::Chunk;
use crate::llm::{ChatMessage, ChatModel};
use crate::{RepoChatError, Result};

pub use memory::{ConversationMemory, DEFAULT_THREAD, Turn};

/// Question used for the repository presentation
pub const SUMMARY_QUESTION: &str = "Write a very detailed and professional presentation of this \
    repository, allowing you to quickly get to grips with and launch the project. The project \
    name should appear in the headline.";

const CONTEXT_SEPARATOR: &str = "\n\n---\n\n";

#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedChunk {
    pub chunk: Chunk,
    pub score: f32,
}

#[async_trait]
pub trait ContextRetriever: Send + Sync {
    /// Up to `k` chunks nearest to `question`, best first
    async fn retrieve(&self, question: &str, k: usize) -> Result<Vec<RetrievedChunk>>;
}

/// Retrieves from the LanceDB collection of the latest completed build
pub struct LanceRetriever {
    database: Database,
    vector_store: Arc<RwLock<VectorStore>>,
    embedder: Arc<dyn Embedder>,
    collection: String,
}

impl LanceRetriever {
    #[inline]
    pub fn new(
        database: Database,
        vector_store: Arc<RwLock<VectorStore>>,
        embedder: Arc<dyn Embedder>,
        collection: impl Into<String>,
    ) -> Self {
        Self {
            database,
            vector_store,
            embedder,
            collection: collection.into(),
        }
    }
}

#[async_trait]
impl ContextRetriever for LanceRetriever {
    async fn retrieve(&self, question: &str, k: usize) -> Result<Vec<RetrievedChunk>> {
        let build = self
            .database
            .latest_completed_build(&self.collection)
            .await
            .map_err(|e| RepoChatError::Database(format!("{e:#}")))?;
        if build.is_none() {
            return Err(RepoChatError::EmptyIndex);
        }

        let query = self
            .embedder
            .embed_query(question)
            .map_err(|e| RepoChatError::Embedding(format!("{e:#}")))?;

        let results = self.vector_store.read().await.search_similar(&query, k).await?;
        debug!("Retrieved {} chunks", results.len());

        Ok(results
            .into_iter()
            .map(|result| RetrievedChunk {
                chunk: result.chunk,
                score: result.similarity_score,
            })
            .collect())
    }
}

/// Render each chunk as its `key=value` metadata line followed by its text
#[inline]
pub fn format_context(chunks: &[RetrievedChunk]) -> String {
    chunks
        .iter()
        .map(|retrieved| {
            let meta = retrieved
                .chunk
                .metadata()
                .into_iter()
                .map(|(key, value)| format!("{key}={value}"))
                .collect::<Vec<_>>()
                .join("; ");
            format!("[{meta}]\n{}", retrieved.chunk.content())
        })
        .collect::<Vec<_>>()
        .join(CONTEXT_SEPARATOR)
}

/// Fill the answering instructions with context and question
#[inline]
pub fn render_prompt(context: &str, question: &str, fallback: &str) -> String {
    format!(
        "You are an expert software assistant helping a developer understand a code repository.\n\
         \n\
         Use only the provided context to answer the question.\n\
         If the answer is not contained in the context, say: \"{fallback}\"\n\
         \n\
         Give clear, concise, and technically accurate explanations. You may format code \
         snippets using Markdown when needed.\n\
         \n\
         Context:\n\
         ---------\n\
         {context}\n\
         ---------\n\
         \n\
         Question: {question}\n\
         Answer:"
    )
}

pub struct ChatPipeline {
    retriever: Arc<dyn ContextRetriever>,
    model: Arc<dyn ChatModel>,
    memory: ConversationMemory,
    config: ChatConfig,
}

impl ChatPipeline {
    #[inline]
    pub fn new(
        retriever: Arc<dyn ContextRetriever>,
        model: Arc<dyn ChatModel>,
        config: ChatConfig,
    ) -> Self {
        Self {
            retriever,
            model,
            memory: ConversationMemory::from_config(&config),
            config,
        }
    }

    #[inline]
    pub fn memory(&self) -> &ConversationMemory {
        &self.memory
    }

    /// Answer `question` within `thread_id`, recording the turn on success
    #[inline]
    pub async fn ask(&self, question: &str, thread_id: &str) -> Result<String> {
        info!("Answering question in thread {}", thread_id);
        let history = self
            .memory
            .history(thread_id, self.config.history_turns)
            .await;

        let answer = self.answer(question, &history).await?;

        self.memory
            .append(
                thread_id,
                Turn {
                    question: question.to_string(),
                    answer: answer.clone(),
                },
            )
            .await;
        Ok(answer)
    }

    /// Presentation of the whole repository. Thread history is neither read
    /// nor written.
    #[inline]
    pub async fn get_summary(&self, thread_id: &str) -> Result<String> {
        info!("Summarising repository for thread {}", thread_id);
        self.answer(SUMMARY_QUESTION, &[]).await
    }

    #[inline]
    pub async fn reset(&self, thread_id: &str) -> bool {
        self.memory.reset(thread_id).await
    }

    async fn answer(&self, question: &str, history: &[Turn]) -> Result<String> {
        let chunks = self.retriever.retrieve(question, self.config.top_k).await?;
        if chunks.is_empty() {
            debug!("No context retrieved, returning fallback answer");
            return Ok(self.config.fallback_answer.clone());
        }

        let context = format_context(&chunks);
        let prompt = render_prompt(&context, question, &self.config.fallback_answer);

        let mut messages = Vec::with_capacity(history.len() * 2 + 1);
        for turn in history {
            messages.push(ChatMessage::user(turn.question.as_str()));
            messages.push(ChatMessage::assistant(turn.answer.as_str()));
        }
        messages.push(ChatMessage::user(prompt));

        self.model
            .complete(&messages)
            .map_err(|e| RepoChatError::Generation(format!("{e:#}")))
    }
}
