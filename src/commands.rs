use anyhow::{Context, Result};
use console::style;
use dialoguer::Input;
use tracing::{error, info};
use uuid::Uuid;

use crate::config::Config;
use crate::context::RepoChat;
use crate::symbols::Symbol;

async fn open_context() -> Result<RepoChat> {
    let config = Config::load_default().context("Failed to load configuration")?;
    RepoChat::new(config)
        .await
        .context("Failed to open the repo-chat data directory")
}

/// Clone and index a repository, replacing the previous index
#[inline]
pub async fn index_repository(url: Option<String>) -> Result<()> {
    let app = open_context().await?;
    info!("Indexing {}", url.as_deref().unwrap_or("default repository"));

    match app.build_index(url.as_deref()).await {
        Ok(report) => {
            println!("Index build completed!");
            println!("  Build: {}", report.build_id);
            println!("  Repository: {}", report.repository_url);
            println!("  Chunks embedded: {}", report.chunk_count);
            println!("  Symbols extracted: {}", report.symbol_count);
            println!("  Duration: {:?}", report.duration);

            if !report.failures.is_empty() {
                println!("  Files that could not be parsed: {}", report.failures.len());
                for failure in &report.failures {
                    println!("    ⚠️  {}: {}", failure.path, failure.message);
                }
            }
            Ok(())
        }
        Err(e) => {
            error!("Index build failed: {}", e);
            Err(e.into())
        }
    }
}

/// Answer a single question
#[inline]
pub async fn ask_question(question: &str, thread: Option<&str>) -> Result<()> {
    let app = open_context().await?;
    let answer = app.ask(question, thread).await?;
    println!("{answer}");
    Ok(())
}

#[inline]
pub async fn show_summary() -> Result<()> {
    let app = open_context().await?;
    let summary = app.get_summary(None).await?;
    println!("{summary}");
    Ok(())
}

/// Interactive question loop on one conversation thread
#[inline]
pub async fn run_chat(thread: Option<String>) -> Result<()> {
    let app = open_context().await?;
    let thread_id = thread.unwrap_or_else(|| Uuid::new_v4().to_string());

    eprintln!("{}", style("💬 repo-chat").bold().cyan());
    eprintln!(
        "Thread {}. Type {} to clear the conversation, {} for a repository overview, {} to quit.",
        style(&thread_id).dim(),
        style("/reset").yellow(),
        style("/summary").yellow(),
        style("/exit").yellow()
    );
    eprintln!();

    loop {
        let Ok(line) = Input::<String>::new()
            .with_prompt("You")
            .allow_empty(true)
            .interact_text()
        else {
            break;
        };

        let line = line.trim();
        let result = match line {
            "" => continue,
            "/exit" | "/quit" => break,
            "/reset" => {
                app.reset_chat(Some(&thread_id)).await;
                eprintln!("{}", style("Conversation cleared.").dim());
                continue;
            }
            "/summary" => app.get_summary(Some(&thread_id)).await,
            question => app.ask(question, Some(&thread_id)).await,
        };

        match result {
            Ok(answer) => {
                println!();
                println!("{answer}");
                println!();
            }
            Err(e) => eprintln!("{} {}", style("Error:").red().bold(), e),
        }
    }

    Ok(())
}

/// Top-level modules of the indexed repository
#[inline]
pub async fn list_modules() -> Result<()> {
    let app = open_context().await?;
    let modules = app.list_modules()?;

    if modules.is_empty() {
        println!("No symbols have been indexed yet.");
        println!("Use 'repo-chat index <url>' to index a repository.");
        return Ok(());
    }

    println!("Modules ({} total):", modules.len());
    for module in &modules {
        println!("  {module}");
    }
    Ok(())
}

#[inline]
pub async fn list_symbols(module: &str) -> Result<()> {
    let app = open_context().await?;
    let symbols = app.list_symbols(module)?;

    if symbols.is_empty() {
        println!("No symbols found in module '{module}'.");
        return Ok(());
    }

    println!("Symbols in {} ({} total):", module, symbols.len());
    println!();
    for symbol in &symbols {
        print_symbol(symbol);
    }
    Ok(())
}

fn print_symbol(symbol: &Symbol) {
    println!(
        "{} {}  ({}:{})",
        style(symbol.kind).yellow(),
        style(&symbol.signature).bold(),
        symbol.path,
        symbol.lineno
    );
    for line in symbol.docstring.lines() {
        println!("    {line}");
    }
    println!();
}

/// Show the latest builds and the size of the index
#[inline]
pub async fn show_status() -> Result<()> {
    let app = open_context().await?;
    let status = app.status().await?;

    println!("Collection: {}", status.collection);
    println!("  Embeddings: {}", status.embedding_count);
    println!("  Symbols: {}", status.symbol_count);

    match &status.latest_build {
        Some(build) => {
            println!("  Repository: {}", build.repository_url);
            if let Some(finished) = build.finished_at {
                println!("  Last Indexed: {}", finished.format("%Y-%m-%d %H:%M:%S"));
            }
        }
        None => {
            println!("  No completed build yet.");
            println!("  Use 'repo-chat index <url>' to index a repository.");
        }
    }

    if !status.recent_builds.is_empty() {
        println!();
        println!("Recent builds:");
        for build in &status.recent_builds {
            println!(
                "  {} {} {} ({} chunks, {} symbols, {} unparsed files)",
                build.started_at.format("%Y-%m-%d %H:%M:%S"),
                build.status,
                build.repository_url,
                build.chunk_count,
                build.symbol_count,
                build.failed_files
            );
            if let Some(error) = &build.error_message {
                println!("    ⚠️  Error: {error}");
            }
        }
    }

    Ok(())
}
