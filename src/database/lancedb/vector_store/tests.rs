use super::*;
use crate::ingest::{FileChunk, FileKind};
use tempfile::TempDir;

async fn create_test_store() -> (VectorStore, TempDir) {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let store = VectorStore::open(&temp_dir.path().join("vectors"), "repo_index")
        .await
        .expect("should open vector store");
    (store, temp_dir)
}

fn file_chunk(index: usize, content: &str) -> Chunk {
    Chunk::File(FileChunk {
        path: "docs/guide.md".to_string(),
        file_kind: FileKind::Prose,
        chunk_index: index,
        content: content.to_string(),
    })
}

fn record(index: usize, content: &str, build_id: &str, dim: usize) -> EmbeddingRecord {
    let mut vector = vec![0.0; dim];
    if let Some(slot) = vector.get_mut(index % dim) {
        *slot = 1.0;
    }
    EmbeddingRecord::new(
        &file_chunk(index, content),
        vector,
        build_id,
        "2024-01-01T00:00:00Z",
    )
}

#[tokio::test]
async fn vector_store_initialization() {
    let (store, _temp_dir) = create_test_store().await;

    assert_eq!(store.table_name(), "repo_index");
    assert_eq!(store.vector_dimension(), None);
    assert_eq!(store.count_embeddings().await.expect("can count"), 0);
}

#[tokio::test]
async fn search_on_missing_table_is_empty() {
    let (store, _temp_dir) = create_test_store().await;

    let results = store
        .search_similar(&[1.0, 0.0, 0.0, 0.0, 0.0], 3)
        .await
        .expect("search should succeed");
    assert!(results.is_empty());
}

#[tokio::test]
async fn upsert_and_search() {
    let (mut store, _temp_dir) = create_test_store().await;

    let records: Vec<_> = (0..4)
        .map(|i| record(i, &format!("section {i}"), "build-1", 5))
        .collect();
    store.upsert(&records).await.expect("should upsert");

    assert_eq!(store.vector_dimension(), Some(5));
    assert_eq!(store.count_embeddings().await.expect("can count"), 4);

    let results = store
        .search_similar(&[0.0, 0.0, 1.0, 0.0, 0.0], 2)
        .await
        .expect("search should succeed");
    assert_eq!(results.len(), 2);
    let best = results.first().expect("has a best match");
    assert_eq!(best.chunk.content(), "section 2");
    assert_eq!(best.build_id, "build-1");
    assert!(best.distance <= results.get(1).map_or(f32::MAX, |r| r.distance));
}

#[tokio::test]
async fn upsert_is_idempotent_by_id() {
    let (mut store, _temp_dir) = create_test_store().await;

    let first = vec![record(0, "same text", "build-1", 5)];
    store.upsert(&first).await.expect("should upsert");

    let second = vec![record(0, "same text", "build-2", 5)];
    store.upsert(&second).await.expect("should upsert again");

    assert_eq!(store.count_embeddings().await.expect("can count"), 1);
    let results = store
        .search_similar(&[1.0, 0.0, 0.0, 0.0, 0.0], 5)
        .await
        .expect("search should succeed");
    assert_eq!(results.len(), 1);
    assert_eq!(
        results.first().map(|r| r.build_id.as_str()),
        Some("build-2")
    );
}

#[tokio::test]
async fn prune_removes_other_builds() {
    let (mut store, _temp_dir) = create_test_store().await;

    store
        .upsert(&[record(0, "old text", "build-1", 5), record(1, "kept", "build-1", 5)])
        .await
        .expect("should upsert");
    store
        .upsert(&[record(1, "kept", "build-2", 5), record(2, "new text", "build-2", 5)])
        .await
        .expect("should upsert");
    assert_eq!(store.count_embeddings().await.expect("can count"), 3);

    store
        .prune_other_builds("build-2")
        .await
        .expect("should prune");

    assert_eq!(store.count_embeddings().await.expect("can count"), 2);
    let results = store
        .search_similar(&[1.0, 0.0, 0.0, 0.0, 0.0], 10)
        .await
        .expect("search should succeed");
    assert!(results.iter().all(|r| r.build_id == "build-2"));
    assert!(results.iter().all(|r| r.chunk.content() != "old text"));
}

#[tokio::test]
async fn prune_on_missing_table_is_noop() {
    let (store, _temp_dir) = create_test_store().await;
    store
        .prune_other_builds("build-1")
        .await
        .expect("prune should succeed");
}

#[tokio::test]
async fn dimension_change_recreates_table() {
    let (mut store, _temp_dir) = create_test_store().await;

    store
        .upsert(&[record(0, "five", "build-1", 5)])
        .await
        .expect("should upsert");
    store
        .upsert(&[record(1, "three", "build-2", 3)])
        .await
        .expect("should upsert with new dimension");

    assert_eq!(store.vector_dimension(), Some(3));
    assert_eq!(store.count_embeddings().await.expect("can count"), 1);
}

#[tokio::test]
async fn mixed_dimensions_are_rejected() {
    let (mut store, _temp_dir) = create_test_store().await;

    let result = store
        .upsert(&[record(0, "a", "build-1", 5), record(1, "b", "build-1", 4)])
        .await;
    assert!(matches!(result, Err(RepoChatError::Database(_))));
}

#[tokio::test]
async fn reopen_detects_dimension() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let path = temp_dir.path().join("vectors");
    {
        let mut store = VectorStore::open(&path, "repo_index")
            .await
            .expect("should open");
        store
            .upsert(&[record(0, "persisted", "build-1", 5)])
            .await
            .expect("should upsert");
    }

    let reopened = VectorStore::open(&path, "repo_index")
        .await
        .expect("should reopen");
    assert_eq!(reopened.vector_dimension(), Some(5));
    assert_eq!(reopened.count_embeddings().await.expect("can count"), 1);
}

#[tokio::test]
async fn empty_upsert_is_noop() {
    let (mut store, _temp_dir) = create_test_store().await;
    store.upsert(&[]).await.expect("empty upsert should succeed");
    assert_eq!(store.count_embeddings().await.expect("can count"), 0);
}
