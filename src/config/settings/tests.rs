use super::*;
use serial_test::serial;
use tempfile::TempDir;

const OVERRIDE_VARS: &[&str] = &[
    API_KEY_ENV,
    BASE_URL_ENV,
    CHAT_MODEL_ENV,
    EMBEDDING_MODEL_ENV,
    COLLECTION_ENV,
    REPO_URL_ENV,
];

fn clear_env() {
    for var in OVERRIDE_VARS {
        // SAFETY: tests touching the environment are serialized with #[serial]
        unsafe { env::remove_var(var) };
    }
}

#[test]
fn default_config() {
    let config = Config::default();
    assert_eq!(config.provider.base_url, "https://api.openai.com/v1");
    assert_eq!(config.provider.chat_model, "gpt-4o-mini");
    assert_eq!(config.provider.embedding_model, "text-embedding-3-small");
    assert_eq!(config.index.collection, "repo_index");
    assert_eq!(config.chat.top_k, 10);
    assert_eq!(config.chat.fallback_answer, FALLBACK_ANSWER);
    assert!(config.provider.api_key.is_none());
}

#[test]
fn config_validation() {
    let config = Config::default();
    assert!(config.validate().is_ok());

    let mut invalid_config = config.clone();
    invalid_config.provider.base_url = "ftp://example.com".to_string();
    assert!(matches!(
        invalid_config.validate(),
        Err(ConfigError::InvalidProtocol(_))
    ));

    let mut invalid_config = config.clone();
    invalid_config.provider.chat_model = String::new();
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.provider.batch_size = 0;
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.index.collection = "repo index".to_string();
    assert!(matches!(
        invalid_config.validate(),
        Err(ConfigError::InvalidCollection(_))
    ));

    let mut invalid_config = config.clone();
    invalid_config.chunking.code_chunk_overlap = invalid_config.chunking.code_chunk_size;
    assert!(matches!(
        invalid_config.validate(),
        Err(ConfigError::OverlapTooLarge(_, _))
    ));

    let mut invalid_config = config.clone();
    invalid_config.chat.top_k = 0;
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config;
    invalid_config.chat.history_turns = invalid_config.chat.max_turns + 1;
    assert!(matches!(
        invalid_config.validate(),
        Err(ConfigError::HistoryTooLong(_, _))
    ));
}

#[test]
fn base_url_always_ends_with_slash() {
    let provider = ProviderConfig::default();
    let url = provider.base_url().expect("default base url is valid");
    assert_eq!(url.as_str(), "https://api.openai.com/v1/");
    assert_eq!(
        url.join("embeddings").expect("join works").as_str(),
        "https://api.openai.com/v1/embeddings"
    );
}

#[test]
fn missing_api_key_is_reported() {
    let mut provider = ProviderConfig::default();
    assert!(matches!(
        provider.require_api_key(),
        Err(ConfigError::MissingApiKey)
    ));

    provider.api_key = Some("   ".to_string());
    assert!(provider.require_api_key().is_err());

    provider.api_key = Some("sk-test".to_string());
    assert_eq!(provider.require_api_key().expect("key is set"), "sk-test");
}

#[test]
fn toml_serialization() {
    let config = Config::default();
    let toml_str = toml::to_string(&config).expect("should serialize toml correctly");
    let parsed_config: Config = toml::from_str(&toml_str).expect("should parse toml correctly");
    assert_eq!(config, parsed_config);
}

#[test]
fn partial_toml_uses_defaults() {
    let parsed: Config = toml::from_str(
        r#"
        [chat]
        top_k = 5
        "#,
    )
    .expect("partial config parses");

    assert_eq!(parsed.chat.top_k, 5);
    assert_eq!(parsed.chat.history_turns, 6);
    assert_eq!(parsed.provider, ProviderConfig::default());
}

#[test]
fn setter_validation() {
    let mut provider = ProviderConfig::default();
    assert!(provider.set_chat_model("gpt-4o".to_string()).is_ok());
    assert_eq!(provider.chat_model, "gpt-4o");
    assert!(provider.set_chat_model("  ".to_string()).is_err());
    assert!(provider.set_batch_size(0).is_err());
    assert!(provider.set_batch_size(128).is_ok());
    assert!(provider.set_base_url("not a url".to_string()).is_err());
    assert!(
        provider
            .set_base_url("http://localhost:8080/v1".to_string())
            .is_ok()
    );

    let mut index = IndexConfig::default();
    assert!(index.set_collection("my-repo_2".to_string()).is_ok());
    assert!(index.set_collection(String::new()).is_err());

    let mut chat = ChatConfig::default();
    assert!(chat.set_top_k(5).is_ok());
    assert!(chat.set_top_k(101).is_err());
}

#[test]
fn derived_paths_live_under_base_dir() {
    let config = Config {
        base_dir: PathBuf::from("/tmp/repo-chat-test"),
        ..Config::default()
    };
    assert_eq!(
        config.database_path(),
        PathBuf::from("/tmp/repo-chat-test/metadata.db")
    );
    assert_eq!(
        config.vector_database_path(),
        PathBuf::from("/tmp/repo-chat-test/vectors")
    );
    assert_eq!(
        config.symbols_path(),
        PathBuf::from("/tmp/repo-chat-test/symbols.json")
    );
    assert_eq!(
        config.repository_path(),
        PathBuf::from("/tmp/repo-chat-test/repo")
    );
}

#[test]
#[serial]
fn load_without_file_uses_defaults() {
    clear_env();
    let temp_dir = TempDir::new().expect("should create temp dir");

    let config = Config::load(temp_dir.path()).expect("load should succeed");
    assert_eq!(config.base_dir, temp_dir.path());
    assert_eq!(config.provider, ProviderConfig::default());
}

#[test]
#[serial]
fn save_and_load_round_trip() {
    clear_env();
    let temp_dir = TempDir::new().expect("should create temp dir");

    let mut config = Config {
        base_dir: temp_dir.path().to_path_buf(),
        ..Config::default()
    };
    config.chat.top_k = 7;
    config.index.default_repository = Some("https://github.com/example/project".to_string());
    config.save().expect("save should succeed");

    let loaded = Config::load(temp_dir.path()).expect("load should succeed");
    assert_eq!(loaded, config);
}

#[test]
#[serial]
fn environment_overrides_file_values() {
    clear_env();
    let temp_dir = TempDir::new().expect("should create temp dir");
    fs::write(
        temp_dir.path().join("config.toml"),
        r#"
        [provider]
        chat_model = "from-file"
        "#,
    )
    .expect("should write config");

    // SAFETY: tests touching the environment are serialized with #[serial]
    unsafe {
        env::set_var(API_KEY_ENV, "sk-env");
        env::set_var(CHAT_MODEL_ENV, "from-env");
        env::set_var(COLLECTION_ENV, "env_collection");
    }

    let config = Config::load(temp_dir.path()).expect("load should succeed");
    clear_env();

    assert_eq!(config.provider.api_key.as_deref(), Some("sk-env"));
    assert_eq!(config.provider.chat_model, "from-env");
    assert_eq!(config.index.collection, "env_collection");
}

#[test]
#[serial]
fn invalid_file_is_rejected() {
    clear_env();
    let temp_dir = TempDir::new().expect("should create temp dir");
    fs::write(
        temp_dir.path().join("config.toml"),
        r#"
        [chat]
        top_k = 0
        "#,
    )
    .expect("should write config");

    assert!(Config::load(temp_dir.path()).is_err());
}

#[test]
#[serial]
fn stored_file_is_read_without_overrides() {
    clear_env();
    let temp_dir = TempDir::new().expect("should create temp dir");
    fs::write(
        temp_dir.path().join("config.toml"),
        r#"
        [provider]
        chat_model = "from-file"
        "#,
    )
    .expect("should write config");

    // SAFETY: tests touching the environment are serialized with #[serial]
    unsafe {
        env::set_var(API_KEY_ENV, "sk-env");
        env::set_var(CHAT_MODEL_ENV, "from-env");
    }
    let stored = Config::load_file(temp_dir.path());
    clear_env();

    let stored = stored
        .expect("file should parse")
        .expect("file should exist");
    assert!(stored.provider.api_key.is_none());
    assert_eq!(stored.provider.chat_model, "from-file");
    assert_eq!(stored.base_dir, temp_dir.path());
}

#[test]
fn missing_stored_file_is_none() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let stored = Config::load_file(temp_dir.path()).expect("missing file is not an error");
    assert!(stored.is_none());
}

#[test]
fn unparsable_stored_file_is_an_error() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    fs::write(temp_dir.path().join("config.toml"), "[index\n").expect("should write config");
    assert!(Config::load_file(temp_dir.path()).is_err());
}

#[test]
fn file_names_count_as_indexable_inputs() {
    let mut index = IndexConfig::default();
    assert_eq!(index.file_names, vec!["requirements.txt"]);

    index.code_extensions.clear();
    index.doc_extensions.clear();
    assert!(index.validate().is_ok());

    index.file_names.clear();
    assert!(matches!(index.validate(), Err(ConfigError::NoExtensions)));
}
