
use std::path::PathBuf;

use anyhow::{Context, Result};
use console::style;
use dialoguer::{Confirm, Input, Password};

use super::{ChatConfig, Config, IndexConfig, ProviderConfig};

#[inline]
pub fn run_interactive_config() -> Result<()> {
    eprintln!("{}", style("🔧 repo-chat Configuration Setup").bold().cyan());
    eprintln!();

    let mut config = load_existing_config()?;

    eprintln!("{}", style("Provider Configuration").bold().yellow());
    eprintln!("Configure the OpenAI-compatible API used for embeddings and answers.");
    eprintln!();

    configure_provider(&mut config.provider)?;

    eprintln!();
    eprintln!("{}", style("Index Configuration").bold().yellow());
    configure_index(&mut config.index, &mut config.chat)?;

    eprintln!();
    eprintln!("{}", style("Testing configuration...").yellow());

    if test_provider_connection(&config.provider) {
        eprintln!("{}", style("✓ Provider reachable!").green());
    } else {
        eprintln!("{}", style("⚠ Warning: Could not reach the provider").yellow());
        eprintln!("You can continue, but indexing and chat will fail until it is reachable.");
    }

    eprintln!();
    if Confirm::new()
        .with_prompt("Save configuration?")
        .default(true)
        .interact()?
    {
        config.save().context("Failed to save configuration")?;
        eprintln!("{}", style("✓ Configuration saved successfully!").green());
        eprintln!(
            "Configuration saved to: {}",
            style(config.config_file_path().display()).cyan()
        );
        if config.provider.api_key.is_some() {
            eprintln!(
                "{}",
                style("Note: the API key is stored in plain text in the config file.").dim()
            );
        }
    } else {
        eprintln!("Configuration not saved.");
    }

    Ok(())
}

#[inline]
pub fn show_config() -> Result<()> {
    let config = Config::load_default().context("Failed to load configuration")?;

    eprintln!("{}", style("📋 Current Configuration").bold().cyan());
    eprintln!();

    eprintln!("{}", style("Provider Settings:").bold().yellow());
    eprintln!("  Base URL: {}", style(&config.provider.base_url).cyan());
    eprintln!("  API Key: {}", style(redact(config.provider.api_key.as_deref())).cyan());
    eprintln!("  Chat Model: {}", style(&config.provider.chat_model).cyan());
    eprintln!(
        "  Embedding Model: {}",
        style(&config.provider.embedding_model).cyan()
    );
    eprintln!("  Batch Size: {}", style(config.provider.batch_size).cyan());

    eprintln!();
    eprintln!("{}", style("Index Settings:").bold().yellow());
    eprintln!("  Collection: {}", style(&config.index.collection).cyan());
    eprintln!(
        "  Default Repository: {}",
        style(config.index.default_repository.as_deref().unwrap_or("(none)")).cyan()
    );
    eprintln!(
        "  Code Extensions: {}",
        style(config.index.code_extensions.join(", ")).cyan()
    );
    eprintln!(
        "  Doc Extensions: {}",
        style(config.index.doc_extensions.join(", ")).cyan()
    );
    eprintln!(
        "  File Names: {}",
        style(config.index.file_names.join(", ")).cyan()
    );

    eprintln!();
    eprintln!("{}", style("Chat Settings:").bold().yellow());
    eprintln!("  Top K: {}", style(config.chat.top_k).cyan());
    eprintln!("  History Turns: {}", style(config.chat.history_turns).cyan());

    eprintln!();
    eprintln!(
        "Data directory: {}",
        style(config.get_base_dir().display()).dim()
    );
    eprintln!(
        "Config file: {}",
        style(config.config_file_path().display()).dim()
    );

    Ok(())
}

fn redact(key: Option<&str>) -> String {
    match key {
        None => "(not set)".to_string(),
        Some(key) if key.chars().count() <= 8 => "****".to_string(),
        Some(key) => {
            let prefix: String = key.chars().take(4).collect();
            format!("{prefix}****")
        }
    }
}

fn load_existing_config() -> Result<Config> {
    load_existing_config_from(Config::config_dir()?)
}

/// The stored file as written, so environment overrides are never saved back.
/// A file that cannot be read or parsed is an error rather than a reset.
fn load_existing_config_from(config_dir: PathBuf) -> Result<Config> {
    if let Some(config) = Config::load_file(&config_dir)? {
        return Ok(config);
    }

    eprintln!(
        "{}",
        style("No existing configuration found. Using defaults.").yellow()
    );
    Ok(Config {
        base_dir: config_dir,
        ..Config::default()
    })
}

fn configure_provider(provider: &mut ProviderConfig) -> Result<()> {
    let base_url: String = Input::new()
        .with_prompt("API base URL")
        .default(provider.base_url.clone())
        .validate_with(|input: &String| -> Result<(), String> {
            let temp_config = ProviderConfig {
                base_url: input.clone(),
                ..ProviderConfig::default()
            };
            temp_config.base_url().map(|_| ()).map_err(|e| e.to_string())
        })
        .interact_text()?;

    let api_key: String = Password::new()
        .with_prompt("API key (leave empty to use OPENAI_API_KEY)")
        .allow_empty_password(true)
        .interact()?;

    let chat_model: String = Input::new()
        .with_prompt("Chat model")
        .default(provider.chat_model.clone())
        .validate_with(|input: &String| -> Result<(), &str> {
            if input.trim().is_empty() {
                Err("Model name cannot be empty")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    let embedding_model: String = Input::new()
        .with_prompt("Embedding model")
        .default(provider.embedding_model.clone())
        .validate_with(|input: &String| -> Result<(), &str> {
            if input.trim().is_empty() {
                Err("Model name cannot be empty")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    let batch_size: u32 = Input::new()
        .with_prompt("Batch size for embedding generation")
        .default(provider.batch_size)
        .validate_with(|input: &u32| -> Result<(), &str> {
            if *input == 0 {
                Err("Batch size must be greater than 0")
            } else if *input > 2048 {
                Err("Batch size must be 2048 or less")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    provider.set_base_url(base_url)?;
    if !api_key.trim().is_empty() {
        provider.api_key = Some(api_key);
    }
    provider.set_chat_model(chat_model)?;
    provider.set_embedding_model(embedding_model)?;
    provider.set_batch_size(batch_size)?;

    Ok(())
}

fn configure_index(index: &mut IndexConfig, chat: &mut ChatConfig) -> Result<()> {
    let collection: String = Input::new()
        .with_prompt("Vector collection name")
        .default(index.collection.clone())
        .interact_text()?;

    let default_repository: String = Input::new()
        .with_prompt("Default repository URL (optional)")
        .default(index.default_repository.clone().unwrap_or_default())
        .allow_empty(true)
        .interact_text()?;

    let top_k: usize = Input::new()
        .with_prompt("Chunks retrieved per question")
        .default(chat.top_k)
        .interact_text()?;

    index.set_collection(collection)?;
    index.default_repository = Some(default_repository).filter(|url| !url.trim().is_empty());
    chat.set_top_k(top_k)?;

    Ok(())
}

fn test_provider_connection(provider: &ProviderConfig) -> bool {
    let Ok(url) = provider.base_url().and_then(|base| {
        base.join("models")
            .map_err(|_| super::ConfigError::InvalidUrl(provider.base_url.clone()))
    }) else {
        return false;
    };

    let agent: ureq::Agent = ureq::Agent::config_builder()
        .timeout_global(Some(std::time::Duration::from_secs(5)))
        .build()
        .into();

    let mut request = agent.get(url.as_str());
    if let Ok(key) = provider.require_api_key() {
        request = request.header("Authorization", format!("Bearer {key}"));
    }

    match request.call() {
        Ok(_) => true,
        // An auth failure still proves the endpoint exists
        Err(ureq::Error::StatusCode(code)) if (400..500).contains(&code) => true,
        Err(_) => false,
    }
}
