#[cfg(test)]
mod tests;

use super::{ChunkMetadata, EmbeddingRecord};
use crate::ingest::Chunk;
use crate::{RepoChatError, config::Config};
use arrow::array::{Array, FixedSizeListArray, Float32Array, RecordBatchIterator, StringArray, UInt32Array};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use futures::TryStreamExt;
use lancedb::{
    Connection, Table,
    query::{ExecutableQuery, QueryBase},
};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

type Result<T> = std::result::Result<T, RepoChatError>;

/// Vector database store using LanceDB for similarity search.
/// One table per collection; the table is created on first upsert.
pub struct VectorStore {
    connection: Connection,
    table_name: String,
    vector_dimension: Option<usize>,
}

/// Search result from vector similarity search
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub chunk: Chunk,
    pub build_id: String,
    pub similarity_score: f32,
    pub distance: f32,
}

fn db_error(context: &str, e: impl std::fmt::Display) -> RepoChatError {
    RepoChatError::Database(format!("{context}: {e}"))
}

impl VectorStore {
    /// Open the store under the configured data directory, using the
    /// configured collection as the table name
    #[inline]
    pub async fn new(config: &Config) -> Result<Self> {
        Self::open(&config.vector_database_path(), &config.index.collection).await
    }

    #[inline]
    pub async fn open(db_path: &Path, table_name: &str) -> Result<Self> {
        debug!("Initializing LanceDB at path: {:?}", db_path);

        std::fs::create_dir_all(db_path)
            .map_err(|e| db_error("Failed to create vector database directory", e))?;

        let uri = format!("file://{}", db_path.display());
        let connection = lancedb::connect(&uri)
            .execute()
            .await
            .map_err(|e| db_error("Failed to connect to LanceDB", e))?;

        let mut store = Self {
            connection,
            table_name: table_name.to_string(),
            vector_dimension: None,
        };

        if store.table_exists().await? {
            match store.detect_existing_vector_dimension().await {
                Ok(dim) => {
                    store.vector_dimension = Some(dim);
                    info!("Detected existing vector dimension: {}", dim);
                }
                Err(e) => warn!(
                    "Could not detect vector dimension from existing table: {}",
                    e
                ),
            }
        }

        debug!("Vector store {} opened", store.table_name);
        Ok(store)
    }

    #[inline]
    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    #[inline]
    pub fn vector_dimension(&self) -> Option<usize> {
        self.vector_dimension
    }

    async fn table_exists(&self) -> Result<bool> {
        let table_names = self
            .connection
            .table_names()
            .execute()
            .await
            .map_err(|e| db_error("Failed to list tables", e))?;

        Ok(table_names.contains(&self.table_name))
    }

    async fn open_table(&self) -> Result<Table> {
        self.connection
            .open_table(&self.table_name)
            .execute()
            .await
            .map_err(|e| db_error("Failed to open table", e))
    }

    /// Detect vector dimension from existing table schema
    async fn detect_existing_vector_dimension(&self) -> Result<usize> {
        let table = self.open_table().await?;
        let schema = table
            .schema()
            .await
            .map_err(|e| db_error("Failed to get table schema", e))?;

        schema
            .fields()
            .iter()
            .find(|field| field.name() == "vector")
            .and_then(|field| match field.data_type() {
                DataType::FixedSizeList(_, size) => usize::try_from(*size).ok(),
                _ => None,
            })
            .ok_or_else(|| {
                RepoChatError::Database(
                    "Could not find vector column or determine dimension".to_string(),
                )
            })
    }

    /// Create schema with the specified vector dimension
    fn create_schema(vector_dim: usize) -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new(
                "vector",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    i32::try_from(vector_dim).unwrap_or(i32::MAX),
                ),
                false,
            ),
            Field::new("build_id", DataType::Utf8, false),
            Field::new("origin", DataType::Utf8, false),
            Field::new("path", DataType::Utf8, false),
            Field::new("file_kind", DataType::Utf8, true),
            Field::new("chunk_index", DataType::UInt32, true),
            Field::new("name", DataType::Utf8, true),
            Field::new("kind", DataType::Utf8, true),
            Field::new("signature", DataType::Utf8, true),
            Field::new("docstring", DataType::Utf8, true),
            Field::new("lineno", DataType::UInt32, true),
            Field::new("end_lineno", DataType::UInt32, true),
            Field::new("content", DataType::Utf8, false),
            Field::new("created_at", DataType::Utf8, false),
        ]))
    }

    /// Insert or replace records by id.
    ///
    /// Not transactional across calls: if a later batch fails, earlier
    /// batches stay visible.
    #[inline]
    pub async fn upsert(&mut self, records: &[EmbeddingRecord]) -> Result<()> {
        let Some(first) = records.first() else {
            debug!("No embeddings to store");
            return Ok(());
        };

        let vector_dim = first.vector.len();
        if let Some(bad) = records.iter().find(|r| r.vector.len() != vector_dim) {
            return Err(RepoChatError::Database(format!(
                "Embedding {} has {} dimensions, expected {}",
                bad.id,
                bad.vector.len(),
                vector_dim
            )));
        }

        if self.vector_dimension != Some(vector_dim) || !self.table_exists().await? {
            if let Some(previous) = self.vector_dimension {
                if previous != vector_dim {
                    warn!(
                        "Vector dimension changed from {} to {}, recreating table",
                        previous, vector_dim
                    );
                }
            }
            self.recreate_table_with_dimension(vector_dim).await?;
            self.vector_dimension = Some(vector_dim);
        }

        debug!("Upserting batch of {} embeddings", records.len());

        let record_batch = Self::create_record_batch(records, vector_dim)?;
        let table = self.open_table().await?;

        let schema = record_batch.schema();
        let reader = RecordBatchIterator::new(std::iter::once(Ok(record_batch)), schema);

        let mut merge = table.merge_insert(&["id"]);
        merge
            .when_matched_update_all(None)
            .when_not_matched_insert_all();
        merge
            .execute(Box::new(reader))
            .await
            .map_err(|e| db_error("Failed to upsert embeddings", e))?;

        info!("Upserted {} embeddings", records.len());
        Ok(())
    }

    /// Recreate table with new vector dimension
    async fn recreate_table_with_dimension(&self, vector_dim: usize) -> Result<()> {
        info!("Creating table {} with vector dimension: {}", self.table_name, vector_dim);

        self.drop_table_if_exists().await?;

        self.connection
            .create_empty_table(&self.table_name, Self::create_schema(vector_dim))
            .execute()
            .await
            .map_err(|e| db_error("Failed to create table", e))?;

        Ok(())
    }

    /// Create a RecordBatch from embedding records
    fn create_record_batch(records: &[EmbeddingRecord], vector_dim: usize) -> Result<RecordBatch> {
        let len = records.len();

        let mut ids = Vec::with_capacity(len);
        let mut flat_values = Vec::with_capacity(len * vector_dim);
        let mut build_ids = Vec::with_capacity(len);
        let mut origins = Vec::with_capacity(len);
        let mut paths = Vec::with_capacity(len);
        let mut file_kinds = Vec::with_capacity(len);
        let mut chunk_indices = Vec::with_capacity(len);
        let mut names = Vec::with_capacity(len);
        let mut kinds = Vec::with_capacity(len);
        let mut signatures = Vec::with_capacity(len);
        let mut docstrings = Vec::with_capacity(len);
        let mut linenos = Vec::with_capacity(len);
        let mut end_linenos = Vec::with_capacity(len);
        let mut contents = Vec::with_capacity(len);
        let mut created_ats = Vec::with_capacity(len);

        for record in records {
            let metadata = &record.metadata;
            ids.push(record.id.as_str());
            flat_values.extend_from_slice(&record.vector);
            build_ids.push(record.build_id.as_str());
            origins.push(metadata.origin.as_str());
            paths.push(metadata.path.as_str());
            file_kinds.push(metadata.file_kind.as_deref());
            chunk_indices.push(metadata.chunk_index);
            names.push(metadata.name.as_deref());
            kinds.push(metadata.kind.as_deref());
            signatures.push(metadata.signature.as_deref());
            docstrings.push(metadata.docstring.as_deref());
            linenos.push(metadata.lineno);
            end_linenos.push(metadata.end_lineno);
            contents.push(metadata.content.as_str());
            created_ats.push(record.created_at.as_str());
        }

        let field = Arc::new(Field::new("item", DataType::Float32, true));
        let vector_array = FixedSizeListArray::try_new(
            field,
            i32::try_from(vector_dim).unwrap_or(i32::MAX),
            Arc::new(Float32Array::from(flat_values)),
            None,
        )
        .map_err(|e| db_error("Failed to create vector array", e))?;

        let arrays: Vec<Arc<dyn Array>> = vec![
            Arc::new(StringArray::from(ids)),
            Arc::new(vector_array),
            Arc::new(StringArray::from(build_ids)),
            Arc::new(StringArray::from(origins)),
            Arc::new(StringArray::from(paths)),
            Arc::new(StringArray::from(file_kinds)),
            Arc::new(UInt32Array::from(chunk_indices)),
            Arc::new(StringArray::from(names)),
            Arc::new(StringArray::from(kinds)),
            Arc::new(StringArray::from(signatures)),
            Arc::new(StringArray::from(docstrings)),
            Arc::new(UInt32Array::from(linenos)),
            Arc::new(UInt32Array::from(end_linenos)),
            Arc::new(StringArray::from(contents)),
            Arc::new(StringArray::from(created_ats)),
        ];

        RecordBatch::try_new(Self::create_schema(vector_dim), arrays)
            .map_err(|e| db_error("Failed to create record batch", e))
    }

    /// Nearest chunks to `query_vector`; an empty or missing collection
    /// yields no results
    #[inline]
    pub async fn search_similar(&self, query_vector: &[f32], limit: usize) -> Result<Vec<SearchResult>> {
        debug!("Searching for similar vectors with limit: {}", limit);

        if limit == 0 || !self.table_exists().await? {
            return Ok(Vec::new());
        }

        let table = self.open_table().await?;
        let mut results = table
            .vector_search(query_vector)
            .map_err(|e| db_error("Failed to create vector search", e))?
            .column("vector")
            .limit(limit)
            .execute()
            .await
            .map_err(|e| db_error("Failed to execute search", e))?;

        let mut search_results = Vec::new();
        while let Some(batch) = results
            .try_next()
            .await
            .map_err(|e| db_error("Failed to read result stream", e))?
        {
            search_results.extend(Self::parse_search_batch(&batch)?);
        }

        debug!("Parsed {} search results", search_results.len());
        Ok(search_results)
    }

    /// Parse a single record batch from search results
    fn parse_search_batch(batch: &RecordBatch) -> Result<Vec<SearchResult>> {
        let build_ids = string_column(batch, "build_id")?;
        let origins = string_column(batch, "origin")?;
        let paths = string_column(batch, "path")?;
        let file_kinds = string_column(batch, "file_kind")?;
        let chunk_indices = u32_column(batch, "chunk_index")?;
        let names = string_column(batch, "name")?;
        let kinds = string_column(batch, "kind")?;
        let signatures = string_column(batch, "signature")?;
        let docstrings = string_column(batch, "docstring")?;
        let linenos = u32_column(batch, "lineno")?;
        let end_linenos = u32_column(batch, "end_lineno")?;
        let contents = string_column(batch, "content")?;

        let distances = batch
            .column_by_name("_distance")
            .and_then(|col| col.as_any().downcast_ref::<Float32Array>());

        let mut search_results = Vec::with_capacity(batch.num_rows());
        for row in 0..batch.num_rows() {
            let metadata = ChunkMetadata {
                origin: origins.value(row).to_string(),
                path: paths.value(row).to_string(),
                file_kind: optional_string(file_kinds, row),
                chunk_index: optional_u32(chunk_indices, row),
                name: optional_string(names, row),
                kind: optional_string(kinds, row),
                signature: optional_string(signatures, row),
                docstring: optional_string(docstrings, row),
                lineno: optional_u32(linenos, row),
                end_lineno: optional_u32(end_linenos, row),
                content: contents.value(row).to_string(),
            };

            let Some(chunk) = metadata.into_chunk() else {
                warn!("Skipping row with unknown origin {:?}", origins.value(row));
                continue;
            };

            let distance = distances.map_or(0.0, |d| if d.is_null(row) { 0.0 } else { d.value(row) });

            search_results.push(SearchResult {
                chunk,
                build_id: build_ids.value(row).to_string(),
                similarity_score: 1.0 - distance,
                distance,
            });
        }

        Ok(search_results)
    }

    /// Delete every record not written by `build_id`
    #[inline]
    pub async fn prune_other_builds(&self, build_id: &str) -> Result<()> {
        if !self.table_exists().await? {
            return Ok(());
        }

        let table = self.open_table().await?;
        let predicate = format!("build_id != '{}'", build_id.replace('\'', "''"));
        table
            .delete(&predicate)
            .await
            .map_err(|e| db_error("Failed to prune old embeddings", e))?;

        info!("Pruned embeddings from builds other than {}", build_id);
        Ok(())
    }

    /// Get the total number of embeddings stored
    #[inline]
    pub async fn count_embeddings(&self) -> Result<u64> {
        if !self.table_exists().await? {
            return Ok(0);
        }

        let count = self
            .open_table()
            .await?
            .count_rows(None)
            .await
            .map_err(|e| db_error("Failed to count rows", e))?;

        Ok(count as u64)
    }

    /// Drop the collection table if it exists
    #[inline]
    pub async fn drop_table_if_exists(&self) -> Result<()> {
        if self.table_exists().await? {
            info!("Dropping table {}", self.table_name);
            self.connection
                .drop_table(&self.table_name)
                .await
                .map_err(|e| db_error("Failed to drop table", e))?;
        }

        Ok(())
    }
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .ok_or_else(|| RepoChatError::Database(format!("Missing {name} column")))?
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| RepoChatError::Database(format!("Invalid {name} column type")))
}

fn u32_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a UInt32Array> {
    batch
        .column_by_name(name)
        .ok_or_else(|| RepoChatError::Database(format!("Missing {name} column")))?
        .as_any()
        .downcast_ref::<UInt32Array>()
        .ok_or_else(|| RepoChatError::Database(format!("Invalid {name} column type")))
}

fn optional_string(array: &StringArray, row: usize) -> Option<String> {
    (!array.is_null(row)).then(|| array.value(row).to_string())
}

fn optional_u32(array: &UInt32Array, row: usize) -> Option<u32> {
    (!array.is_null(row)).then(|| array.value(row))
}
