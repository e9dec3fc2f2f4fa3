//! Repository ingestion: sync, symbol extraction, file walking and chunking.
//!
//! Ingestion produces the full list of retrievable [`Chunk`]s for a
//! repository. Embedding and storage happen in the indexer.

pub mod chunking;

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

pub use chunking::{ChunkingConfig, RecursiveSplitter};

use crate::config::Config;
use crate::repository::RepositorySync;
use crate::symbols::{self, ParseFailure, Symbol, SymbolKind, is_git_dir, relative_path, store};
use crate::{RepoChatError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Code,
    Prose,
}

impl FileKind {
    #[inline]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Code => "code",
            Self::Prose => "prose",
        }
    }
}

/// A window of a source or documentation file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChunk {
    pub path: String,
    pub file_kind: FileKind,
    pub chunk_index: usize,
    pub content: String,
}

/// The signature and docstring of one symbol
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolChunk {
    pub symbol: Symbol,
    pub content: String,
}

impl SymbolChunk {
    #[inline]
    pub fn new(symbol: Symbol) -> Self {
        let content = format!("# {}\n{}", symbol.signature, symbol.docstring)
            .trim_end()
            .to_string();
        Self { symbol, content }
    }
}

/// Source lines of one function, from the `def` line to the end of its body.
/// Long bodies are split into several parts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BodyChunk {
    pub symbol: Symbol,
    pub part: usize,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "origin", rename_all = "lowercase")]
pub enum Chunk {
    File(FileChunk),
    Symbol(SymbolChunk),
    Body(BodyChunk),
}

impl Chunk {
    #[inline]
    pub fn content(&self) -> &str {
        match self {
            Self::File(chunk) => &chunk.content,
            Self::Symbol(chunk) => &chunk.content,
            Self::Body(chunk) => &chunk.content,
        }
    }

    #[inline]
    pub fn path(&self) -> &str {
        match self {
            Self::File(chunk) => &chunk.path,
            Self::Symbol(chunk) => &chunk.symbol.path,
            Self::Body(chunk) => &chunk.symbol.path,
        }
    }

    #[inline]
    pub fn origin(&self) -> &'static str {
        match self {
            Self::File(_) => "file",
            Self::Symbol(_) => "symbol",
            Self::Body(_) => "body",
        }
    }

    /// Content-addressed id: identical chunks from an unchanged repository
    /// always get the same id.
    #[inline]
    pub fn id(&self) -> String {
        let position = match self {
            Self::File(chunk) => chunk.chunk_index.to_string(),
            Self::Symbol(chunk) => format!("{}:{}", chunk.symbol.lineno, chunk.symbol.name),
            Self::Body(chunk) => format!(
                "{}:{}:{}",
                chunk.symbol.lineno, chunk.symbol.name, chunk.part
            ),
        };

        let mut hasher = Sha256::new();
        for part in [self.origin(), self.path(), position.as_str(), self.content()] {
            hasher.update(part.as_bytes());
            hasher.update([0u8]);
        }
        hex::encode(hasher.finalize())
    }

    /// Key/value pairs shown alongside the content in the model's context
    #[inline]
    pub fn metadata(&self) -> Vec<(&'static str, String)> {
        match self {
            Self::File(chunk) => vec![
                ("path", chunk.path.clone()),
                ("type", chunk.file_kind.as_str().to_string()),
                ("chunk", chunk.chunk_index.to_string()),
            ],
            Self::Symbol(chunk) => vec![
                ("name", chunk.symbol.name.clone()),
                ("kind", chunk.symbol.kind.as_str().to_string()),
                ("signature", chunk.symbol.signature.clone()),
                ("path", chunk.symbol.path.clone()),
                ("lineno", chunk.symbol.lineno.to_string()),
                ("type", "symbol".to_string()),
            ],
            Self::Body(chunk) => vec![
                ("name", chunk.symbol.name.clone()),
                ("signature", chunk.symbol.signature.clone()),
                ("path", chunk.symbol.path.clone()),
                (
                    "lines",
                    format!("{}-{}", chunk.symbol.lineno, chunk.symbol.end_lineno),
                ),
                ("part", chunk.part.to_string()),
                ("type", "body".to_string()),
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestOptions {
    /// Working directory the repository is cloned into
    pub repo_path: PathBuf,
    /// Where the symbol table is written
    pub symbols_path: PathBuf,
    pub clone_depth: u32,
    pub code_extensions: Vec<String>,
    pub doc_extensions: Vec<String>,
    /// Exact file names indexed as code regardless of extension
    pub file_names: Vec<String>,
    pub chunking: ChunkingConfig,
}

impl IngestOptions {
    #[inline]
    pub fn from_config(config: &Config) -> Self {
        Self {
            repo_path: config.repository_path(),
            symbols_path: config.symbols_path(),
            clone_depth: config.index.clone_depth,
            code_extensions: config.index.code_extensions.clone(),
            doc_extensions: config.index.doc_extensions.clone(),
            file_names: config.index.file_names.clone(),
            chunking: config.chunking.clone(),
        }
    }

    /// Kind of file by extension or exact name; files matching neither are
    /// treated as prose when their name starts with `readme`
    #[inline]
    pub fn classify(&self, path: &Path) -> Option<FileKind> {
        let file_name = path.file_name().and_then(|name| name.to_str());
        let extension = path.extension().and_then(|ext| ext.to_str());
        let matches = |list: &[String]| {
            extension.is_some_and(|ext| list.iter().any(|allowed| allowed.eq_ignore_ascii_case(ext)))
        };

        let listed_name = file_name.is_some_and(|name| {
            self.file_names
                .iter()
                .any(|allowed| allowed.eq_ignore_ascii_case(name))
        });
        if listed_name || matches(&self.code_extensions) {
            return Some(FileKind::Code);
        }
        if matches(&self.doc_extensions) {
            return Some(FileKind::Prose);
        }

        let is_readme = file_name.is_some_and(|name| name.to_ascii_lowercase().starts_with("readme"));
        is_readme.then_some(FileKind::Prose)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestOutput {
    pub repo_path: PathBuf,
    /// File chunks in walk order, one chunk per symbol, then function bodies
    pub chunks: Vec<Chunk>,
    pub symbols: Vec<Symbol>,
    pub failures: Vec<ParseFailure>,
}

/// Files under `root` eligible for chunking, sorted by path
#[inline]
pub fn iter_source_files<'a>(
    root: &'a Path,
    options: &'a IngestOptions,
) -> impl Iterator<Item = (PathBuf, FileKind)> + 'a {
    WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| !is_git_dir(entry))
        .filter_map(move |entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("Skipping unreadable entry under {}: {}", root.display(), e);
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .filter_map(move |entry| {
            options
                .classify(entry.path())
                .map(|kind| (entry.into_path(), kind))
        })
}

/// Split one file's text into chunks. Empty windows never appear.
#[inline]
pub fn chunk_file(
    path: &str,
    text: &str,
    file_kind: FileKind,
    chunking: &ChunkingConfig,
) -> Vec<FileChunk> {
    let splitter = match file_kind {
        FileKind::Code => chunking.code_splitter(),
        FileKind::Prose => chunking.prose_splitter(),
    };

    splitter
        .split_text(text)
        .into_iter()
        .enumerate()
        .map(|(chunk_index, content)| FileChunk {
            path: path.to_string(),
            file_kind,
            chunk_index,
            content,
        })
        .collect()
}

/// Ingest an already present checkout: extract and save symbols, then chunk
/// every eligible file.
#[inline]
pub fn ingest_directory(root: &Path, options: &IngestOptions) -> Result<IngestOutput> {
    let report = symbols::parse_repo(root);
    store::save_symbols(&report.symbols, &options.symbols_path)?;

    let mut chunks = Vec::new();
    let mut file_count = 0usize;

    for (path, file_kind) in iter_source_files(root, options) {
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Skipping unreadable file {}: {}", path.display(), e);
                continue;
            }
        };
        let text = String::from_utf8_lossy(&bytes);
        let relative = relative_path(&path, root);

        let file_chunks = chunk_file(&relative, &text, file_kind, &options.chunking);
        debug!("{}: {} chunks", relative, file_chunks.len());
        chunks.extend(file_chunks.into_iter().map(Chunk::File));
        file_count += 1;
    }

    chunks.extend(
        report
            .symbols
            .iter()
            .cloned()
            .map(|symbol| Chunk::Symbol(SymbolChunk::new(symbol))),
    );
    chunks.extend(
        body_chunks(root, &report.symbols, &options.chunking)
            .into_iter()
            .map(Chunk::Body),
    );

    info!(
        "Ingested {} files and {} symbols into {} chunks",
        file_count,
        report.symbols.len(),
        chunks.len()
    );

    Ok(IngestOutput {
        repo_path: root.to_path_buf(),
        chunks,
        symbols: report.symbols,
        failures: report.failures,
    })
}

/// Split the source of every function into body chunks.
///
/// Files that cannot be read again are skipped; their symbols keep their
/// signature chunks.
#[inline]
pub fn body_chunks(root: &Path, symbols: &[Symbol], chunking: &ChunkingConfig) -> Vec<BodyChunk> {
    let splitter = chunking.code_splitter();
    let mut sources: HashMap<&str, Option<Vec<String>>> = HashMap::new();
    let mut bodies = Vec::new();

    for symbol in symbols.iter().filter(|s| s.kind == SymbolKind::Function) {
        let lines = sources.entry(symbol.path.as_str()).or_insert_with(|| {
            match fs::read(root.join(&symbol.path)) {
                Ok(bytes) => Some(
                    String::from_utf8_lossy(&bytes)
                        .lines()
                        .map(str::to_string)
                        .collect(),
                ),
                Err(e) => {
                    warn!("Skipping bodies in {}: {}", symbol.path, e);
                    None
                }
            }
        });
        let Some(lines) = lines.as_ref() else {
            continue;
        };

        let start = symbol.lineno.saturating_sub(1);
        let end = symbol.end_lineno.max(symbol.lineno).min(lines.len());
        let Some(body_lines) = lines.get(start..end) else {
            continue;
        };
        let body = body_lines.join("\n");

        bodies.extend(
            splitter
                .split_text(&body)
                .into_iter()
                .enumerate()
                .map(|(part, content)| BodyChunk {
                    symbol: symbol.clone(),
                    part,
                    content,
                }),
        );
    }

    bodies
}

/// Clone `url` into the working directory and ingest it
#[inline]
pub fn run_ingest(url: &str, options: &IngestOptions) -> Result<IngestOutput> {
    let sync = RepositorySync::new(&options.repo_path, options.clone_depth);
    let repo_path = sync.sync(url)?;
    ingest_directory(&repo_path, options).map_err(|e| match e {
        RepoChatError::Other(inner) => {
            RepoChatError::Other(inner.context(format!("Failed to ingest {url}")))
        }
        other => other,
    })
}
