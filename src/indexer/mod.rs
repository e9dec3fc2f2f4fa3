// Indexer module
// Builds the vector index for a repository and records each build

pub mod lock;


use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use indicatif::{ProgressBar, ProgressStyle};
use itertools::Itertools;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::database::lancedb::{EmbeddingRecord, VectorStore};
use crate::database::sqlite::Database;
use crate::database::sqlite::models::{BuildCompletion, NewBuildFailure, NewIndexBuild};
use crate::embeddings::Embedder;
use crate::ingest::{Chunk, IngestOptions, run_ingest};
use crate::symbols::ParseFailure;
use crate::{RepoChatError, Result};

pub use lock::BuildLock;

/// Outcome of a successful build
#[derive(Debug, Clone, PartialEq)]
pub struct IndexReport {
    pub build_id: String,
    pub repository_url: String,
    pub chunk_count: usize,
    pub symbol_count: usize,
    pub failures: Vec<ParseFailure>,
    pub duration: Duration,
}

/// Embeds repository chunks into the vector store.
///
/// Builds are serialised across processes by [`BuildLock`] and within a
/// process by the write half of the vector store lock.
pub struct Indexer {
    config: Config,
    database: Database,
    vector_store: Arc<RwLock<VectorStore>>,
    embedder: Arc<dyn Embedder>,
}

impl Indexer {
    #[inline]
    pub fn new(
        config: Config,
        database: Database,
        vector_store: Arc<RwLock<VectorStore>>,
        embedder: Arc<dyn Embedder>,
    ) -> Self {
        Self {
            config,
            database,
            vector_store,
            embedder,
        }
    }

    /// Clone `url`, embed every chunk and replace the collection contents.
    ///
    /// On failure the build is recorded as failed, the previous symbol table
    /// is kept and vectors from earlier builds are not pruned.
    #[inline]
    pub async fn build_index(&self, url: &str) -> Result<IndexReport> {
        let _lock = BuildLock::acquire(&self.config.lock_file_path())?;

        // Holding the lock means no other build is running
        self.database
            .fail_interrupted_builds()
            .await
            .map_err(database_error)?;

        let mut store = self.vector_store.write().await;

        let build_id = Uuid::new_v4().to_string();
        self.database
            .start_build(NewIndexBuild {
                id: build_id.clone(),
                repository_url: url.to_string(),
                collection: self.config.index.collection.clone(),
            })
            .await
            .map_err(database_error)?;

        info!("Starting index build {} for {}", build_id, url);
        let started = Instant::now();
        let staging_path = staging_path_for(&self.config.symbols_path());

        match self
            .run_build(url, &build_id, &staging_path, &mut store)
            .await
        {
            Ok(mut report) => {
                report.duration = started.elapsed();
                info!(
                    "Build {} completed: {} chunks, {} symbols in {:.1}s",
                    build_id,
                    report.chunk_count,
                    report.symbol_count,
                    report.duration.as_secs_f64()
                );
                Ok(report)
            }
            Err(e) => {
                error!("Build {} failed: {}", build_id, e);
                if let Err(db_err) = self.database.fail_build(&build_id, &e.to_string()).await {
                    warn!("Failed to record build failure: {:#}", db_err);
                }
                if staging_path.exists() {
                    if let Err(io_err) = fs::remove_file(&staging_path) {
                        warn!("Failed to remove staged symbols: {}", io_err);
                    }
                }
                Err(e)
            }
        }
    }

    async fn run_build(
        &self,
        url: &str,
        build_id: &str,
        staging_path: &Path,
        store: &mut VectorStore,
    ) -> Result<IndexReport> {
        let mut options = IngestOptions::from_config(&self.config);
        options.symbols_path = staging_path.to_path_buf();

        let output = run_ingest(url, &options)?;
        let vectors = self.embed_chunks(&output.chunks)?;

        let created_at = Utc::now().to_rfc3339();
        let records: Vec<EmbeddingRecord> = output
            .chunks
            .iter()
            .zip(vectors)
            .map(|(chunk, vector)| EmbeddingRecord::new(chunk, vector, build_id, &created_at))
            .unique_by(|record| record.id.clone())
            .collect();

        store.upsert(&records).await?;
        store.prune_other_builds(build_id).await?;

        fs::rename(staging_path, self.config.symbols_path())?;

        let completion = BuildCompletion {
            chunk_count: i64::try_from(records.len()).unwrap_or(i64::MAX),
            symbol_count: i64::try_from(output.symbols.len()).unwrap_or(i64::MAX),
            failures: output
                .failures
                .iter()
                .map(|failure| NewBuildFailure {
                    path: failure.path.clone(),
                    message: failure.message.clone(),
                })
                .collect(),
        };
        self.database
            .complete_build(build_id, &completion)
            .await
            .map_err(database_error)?;

        Ok(IndexReport {
            build_id: build_id.to_string(),
            repository_url: url.to_string(),
            chunk_count: records.len(),
            symbol_count: output.symbols.len(),
            failures: output.failures,
            duration: Duration::default(),
        })
    }

    /// Embed chunk texts in provider-sized batches
    fn embed_chunks(&self, chunks: &[Chunk]) -> Result<Vec<Vec<f32>>> {
        let batch_size = usize::try_from(self.config.provider.batch_size)
            .unwrap_or(1)
            .max(1);
        let texts: Vec<String> = chunks.iter().map(|c| c.content().to_string()).collect();

        let bar = progress_bar(texts.len() as u64);
        let mut vectors = Vec::with_capacity(texts.len());

        for batch in texts.chunks(batch_size) {
            let embedded = self
                .embedder
                .embed_documents(batch)
                .map_err(|e| RepoChatError::Embedding(format!("{e:#}")))?;

            if embedded.len() != batch.len() {
                return Err(RepoChatError::Embedding(format!(
                    "Expected {} embeddings, got {}",
                    batch.len(),
                    embedded.len()
                )));
            }

            vectors.extend(embedded);
            bar.inc(batch.len() as u64);
            debug!("Embedded {}/{} chunks", vectors.len(), texts.len());
        }

        bar.finish_and_clear();
        Ok(vectors)
    }
}

fn progress_bar(len: u64) -> ProgressBar {
    if !console::user_attended_stderr() {
        return ProgressBar::hidden();
    }

    let bar = ProgressBar::new(len);
    if let Ok(style) = ProgressStyle::with_template("{bar:40} [{pos}/{len}] Embedding chunks") {
        bar.set_style(style);
    }
    bar
}

/// `symbols.json` is staged as `symbols.json.staging` until the build succeeds
fn staging_path_for(symbols_path: &Path) -> PathBuf {
    let mut name = symbols_path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    name.push(".staging");
    symbols_path.with_file_name(name)
}

fn database_error(e: anyhow::Error) -> RepoChatError {
    RepoChatError::Database(format!("{e:#}"))
}
