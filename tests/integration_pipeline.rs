#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

/// End-to-end tests: index a local git repository and answer questions about it
/// with deterministic in-process providers
use std::collections::hash_map::DefaultHasher;
use std::fs;
use std::hash::{Hash, Hasher};
use std::path::Path;
use std::sync::{Arc, Mutex};

use git2::{Repository, Signature};
use repo_chat::RepoChatError;
use repo_chat::config::{Config, FALLBACK_ANSWER};
use repo_chat::context::RepoChat;
use repo_chat::embeddings::Embedder;
use repo_chat::llm::{ChatMessage, ChatModel};
use tempfile::TempDir;

const DIMENSIONS: usize = 16;

/// Bag-of-words hashing embedder, so texts sharing words end up close
struct HashingEmbedder;

impl Embedder for HashingEmbedder {
    fn embed_documents(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        texts.iter().map(|text| self.embed_query(text)).collect()
    }

    fn embed_query(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        let mut vector = vec![0.0f32; DIMENSIONS];
        for word in text.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()) {
            let mut hasher = DefaultHasher::new();
            word.to_lowercase().hash(&mut hasher);
            let slot = (hasher.finish() % DIMENSIONS as u64) as usize;
            if let Some(value) = vector.get_mut(slot) {
                *value += 1.0;
            }
        }
        Ok(vector)
    }
}

#[derive(Default)]
struct RecordingModel {
    calls: Mutex<Vec<Vec<ChatMessage>>>,
}

impl RecordingModel {
    fn calls(&self) -> Vec<Vec<ChatMessage>> {
        self.calls.lock().expect("lock not poisoned").clone()
    }
}

impl ChatModel for RecordingModel {
    fn complete(&self, messages: &[ChatMessage]) -> anyhow::Result<String> {
        let mut calls = self.calls.lock().expect("lock not poisoned");
        calls.push(messages.to_vec());
        Ok(format!("model answer {}", calls.len()))
    }
}

fn init_source_repo(dir: &Path, files: &[(&str, &str)]) {
    let repo = Repository::init(dir).expect("should init repository");
    for (name, content) in files {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("should create parent");
        }
        fs::write(path, content).expect("should write file");
    }

    let mut index = repo.index().expect("should open index");
    index
        .add_all(["*"], git2::IndexAddOption::DEFAULT, None)
        .expect("should stage files");
    index.write().expect("should write index");
    let tree_id = index.write_tree().expect("should write tree");
    let tree = repo.find_tree(tree_id).expect("should find tree");
    let signature = Signature::now("Test", "test@example.com").expect("signature");
    repo.commit(Some("HEAD"), &signature, &signature, "initial", &tree, &[])
        .expect("should commit");
}

fn sample_repo() -> TempDir {
    let source = TempDir::new().expect("should create source dir");
    init_source_repo(
        source.path(),
        &[
            (
                "calc/math.py",
                "def add(a, b):\n    \"\"\"Add two numbers.\"\"\"\n    return a + b\n\n\n\
                 class Accumulator:\n    \"\"\"Keeps a running total.\"\"\"\n\n    \
                 def push(self, value):\n        self.total += value\n",
            ),
            ("setup.py", "def main():\n    pass\n"),
            (
                "README.md",
                "# Calc\n\nA tiny calculator library.\n\nInstall it with pip install calc.\n",
            ),
        ],
    );
    source
}

async fn open_app(data_dir: &TempDir, model: Arc<RecordingModel>) -> RepoChat {
    let config = Config {
        base_dir: data_dir.path().to_path_buf(),
        ..Config::default()
    };
    RepoChat::with_providers(config, Arc::new(HashingEmbedder), model)
        .await
        .expect("should open app")
}

#[tokio::test]
async fn question_before_first_build_is_empty_index() {
    let data_dir = TempDir::new().expect("should create data dir");
    let model = Arc::new(RecordingModel::default());
    let app = open_app(&data_dir, model.clone()).await;

    let result = app.ask("What does add do?", None).await;

    assert!(matches!(result, Err(RepoChatError::EmptyIndex)));
    assert!(model.calls().is_empty());
    assert!(app.list_modules().expect("can list modules").is_empty());
}

#[tokio::test]
async fn index_then_browse_symbols() {
    let data_dir = TempDir::new().expect("should create data dir");
    let source = sample_repo();
    let app = open_app(&data_dir, Arc::new(RecordingModel::default())).await;

    let report = app
        .build_index(source.path().to_str())
        .await
        .expect("build should succeed");
    assert_eq!(report.symbol_count, 4);

    assert_eq!(
        app.list_modules().expect("can list modules"),
        vec!["calc".to_string(), "setup.py".to_string()]
    );

    let symbols = app.list_symbols("calc").expect("can list symbols");
    let signatures: Vec<&str> = symbols.iter().map(|s| s.signature.as_str()).collect();
    assert_eq!(signatures, vec!["add(a, b)", "Accumulator", "push(self, value)"]);
    let add = symbols.first().expect("add is first");
    assert_eq!(add.docstring, "Add two numbers.");
    assert_eq!(add.path, "calc/math.py");
    assert_eq!(add.lineno, 1);

    let status = app.status().await.expect("can read status");
    assert_eq!(status.symbol_count, 4);
    assert_eq!(status.embedding_count, report.chunk_count as u64);
    assert_eq!(
        status.latest_build.map(|b| b.id),
        Some(report.build_id.clone())
    );
}

#[tokio::test]
async fn answers_are_grounded_in_retrieved_chunks() {
    let data_dir = TempDir::new().expect("should create data dir");
    let source = sample_repo();
    let model = Arc::new(RecordingModel::default());
    let app = open_app(&data_dir, model.clone()).await;
    app.build_index(source.path().to_str())
        .await
        .expect("build should succeed");

    let answer = app
        .ask("What does add do?", Some("session"))
        .await
        .expect("should answer");
    assert_eq!(answer, "model answer 1");

    let calls = model.calls();
    let prompt = calls
        .first()
        .and_then(|messages| messages.last())
        .expect("prompt sent");
    assert!(prompt.content.contains("signature=add(a, b)"));
    assert!(prompt.content.contains("Question: What does add do?"));
    assert!(prompt.content.contains(FALLBACK_ANSWER));
}

#[tokio::test]
async fn threads_do_not_share_history() {
    let data_dir = TempDir::new().expect("should create data dir");
    let source = sample_repo();
    let model = Arc::new(RecordingModel::default());
    let app = open_app(&data_dir, model.clone()).await;
    app.build_index(source.path().to_str())
        .await
        .expect("build should succeed");

    app.ask("How do I install calc?", Some("a"))
        .await
        .expect("should answer");
    app.ask("How do I install it?", Some("b"))
        .await
        .expect("should answer");
    app.ask("And how do I run it?", Some("a"))
        .await
        .expect("should answer");

    let calls = model.calls();
    assert_eq!(calls.get(1).map(Vec::len), Some(1));
    assert_eq!(calls.get(2).map(Vec::len), Some(3));

    assert!(app.reset_chat(Some("a")).await);
    assert!(!app.reset_chat(Some("a")).await);
}

#[tokio::test]
async fn summary_uses_the_repository_context() {
    let data_dir = TempDir::new().expect("should create data dir");
    let source = sample_repo();
    let model = Arc::new(RecordingModel::default());
    let app = open_app(&data_dir, model.clone()).await;
    app.build_index(source.path().to_str())
        .await
        .expect("build should succeed");

    let summary = app.get_summary(None).await.expect("should summarise");
    assert_eq!(summary, "model answer 1");
    let calls = model.calls();
    let messages = calls.first().expect("summary call");
    assert_eq!(messages.len(), 1);
    assert!(
        messages
            .first()
            .is_some_and(|m| m.content.contains("project name should appear in the headline"))
    );
}

#[tokio::test]
async fn missing_repository_url_is_config_error() {
    let data_dir = TempDir::new().expect("should create data dir");
    let app = open_app(&data_dir, Arc::new(RecordingModel::default())).await;

    let result = app.build_index(None).await;
    assert!(matches!(result, Err(RepoChatError::Config(_))));
}

#[tokio::test]
async fn empty_repository_answers_with_fallback() {
    let data_dir = TempDir::new().expect("should create data dir");
    let source = TempDir::new().expect("should create source dir");
    init_source_repo(source.path(), &[("data.csv", "a,b\n1,2\n")]);
    let model = Arc::new(RecordingModel::default());
    let app = open_app(&data_dir, model.clone()).await;

    let report = app
        .build_index(source.path().to_str())
        .await
        .expect("build should succeed");
    assert_eq!(report.chunk_count, 0);

    let answer = app.ask("Anything?", None).await.expect("should answer");
    assert_eq!(answer, FALLBACK_ANSWER);
    assert!(model.calls().is_empty());
}
