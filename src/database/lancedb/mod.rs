// LanceDB vector database module
// Stores chunk embeddings and serves similarity search


pub mod vector_store;

use serde::{Deserialize, Serialize};

use crate::ingest::{BodyChunk, Chunk, FileChunk, FileKind, SymbolChunk};
use crate::symbols::{Symbol, SymbolKind};

pub use vector_store::{SearchResult, VectorStore};

/// Embedding record stored in LanceDB
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    /// Content-addressed chunk id
    pub id: String,
    pub vector: Vec<f32>,
    /// Build that last wrote this record
    pub build_id: String,
    pub metadata: ChunkMetadata,
    pub created_at: String,
}

impl EmbeddingRecord {
    #[inline]
    pub fn new(chunk: &Chunk, vector: Vec<f32>, build_id: &str, created_at: &str) -> Self {
        Self {
            id: chunk.id(),
            vector,
            build_id: build_id.to_string(),
            metadata: ChunkMetadata::from(chunk),
            created_at: created_at.to_string(),
        }
    }
}

/// A chunk flattened into nullable columns. File chunks fill the file
/// columns, symbol and body chunks the symbol columns. Body chunks store
/// their part number in `chunk_index`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// `file`, `symbol` or `body`
    pub origin: String,
    pub path: String,
    pub file_kind: Option<String>,
    pub chunk_index: Option<u32>,
    pub name: Option<String>,
    pub kind: Option<String>,
    pub signature: Option<String>,
    pub docstring: Option<String>,
    pub lineno: Option<u32>,
    pub end_lineno: Option<u32>,
    /// The actual text content of the chunk
    pub content: String,
}

impl From<&Chunk> for ChunkMetadata {
    #[inline]
    fn from(chunk: &Chunk) -> Self {
        match chunk {
            Chunk::File(file) => Self {
                origin: chunk.origin().to_string(),
                path: file.path.clone(),
                file_kind: Some(file.file_kind.as_str().to_string()),
                chunk_index: Some(u32::try_from(file.chunk_index).unwrap_or(u32::MAX)),
                name: None,
                kind: None,
                signature: None,
                docstring: None,
                lineno: None,
                end_lineno: None,
                content: file.content.clone(),
            },
            Chunk::Symbol(symbol_chunk) => Self::for_symbol(
                chunk.origin(),
                &symbol_chunk.symbol,
                None,
                &symbol_chunk.content,
            ),
            Chunk::Body(body) => Self::for_symbol(
                chunk.origin(),
                &body.symbol,
                Some(body.part),
                &body.content,
            ),
        }
    }
}

impl ChunkMetadata {
    fn for_symbol(origin: &str, symbol: &Symbol, part: Option<usize>, content: &str) -> Self {
        Self {
            origin: origin.to_string(),
            path: symbol.path.clone(),
            file_kind: None,
            chunk_index: part.map(|part| u32::try_from(part).unwrap_or(u32::MAX)),
            name: Some(symbol.name.clone()),
            kind: Some(symbol.kind.as_str().to_string()),
            signature: Some(symbol.signature.clone()),
            docstring: Some(symbol.docstring.clone()),
            lineno: Some(u32::try_from(symbol.lineno).unwrap_or(u32::MAX)),
            end_lineno: Some(u32::try_from(symbol.end_lineno).unwrap_or(u32::MAX)),
            content: content.to_string(),
        }
    }

    fn symbol(&mut self) -> Symbol {
        let kind = match self.kind.as_deref() {
            Some("class") => SymbolKind::Class,
            _ => SymbolKind::Function,
        };
        Symbol {
            name: self.name.take().unwrap_or_default(),
            kind,
            signature: self.signature.take().unwrap_or_default(),
            docstring: self.docstring.take().unwrap_or_default(),
            path: std::mem::take(&mut self.path),
            lineno: self.lineno.unwrap_or_default() as usize,
            end_lineno: self.end_lineno.unwrap_or_default() as usize,
        }
    }

    /// Rebuild the chunk this row was written from
    #[inline]
    pub fn into_chunk(mut self) -> Option<Chunk> {
        match self.origin.as_str() {
            "file" => {
                let file_kind = match self.file_kind.as_deref() {
                    Some("code") => FileKind::Code,
                    _ => FileKind::Prose,
                };
                Some(Chunk::File(FileChunk {
                    path: self.path,
                    file_kind,
                    chunk_index: self.chunk_index.unwrap_or_default() as usize,
                    content: self.content,
                }))
            }
            "symbol" => Some(Chunk::Symbol(SymbolChunk {
                symbol: self.symbol(),
                content: self.content,
            })),
            "body" => Some(Chunk::Body(BodyChunk {
                symbol: self.symbol(),
                part: self.chunk_index.unwrap_or_default() as usize,
                content: self.content,
            })),
            _ => None,
        }
    }
}
