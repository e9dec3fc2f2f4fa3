use clap::{Parser, Subcommand};
use repo_chat::Result;
use repo_chat::commands::{
    ask_question, index_repository, list_modules, list_symbols, run_chat, show_status,
    show_summary,
};
use repo_chat::config::{run_interactive_config, show_config};

#[derive(Parser)]
#[command(name = "repo-chat")]
#[command(about = "Index a git repository and ask questions about its code")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure the provider, collection and chat settings
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Clone a repository and rebuild the index from it
    Index {
        /// Repository URL; defaults to index.default_repository
        url: Option<String>,
    },
    /// Ask a single question about the indexed repository
    Ask {
        question: String,
        /// Conversation thread to continue
        #[arg(long)]
        thread: Option<String>,
    },
    /// Print a presentation of the indexed repository
    Summary,
    /// Start an interactive conversation
    Chat {
        /// Conversation thread id; a new one is generated when omitted
        #[arg(long)]
        thread: Option<String>,
    },
    /// List the top-level modules of the indexed repository
    Modules,
    /// List the functions and classes of a module
    Symbols {
        module: String,
    },
    /// Show index build history and collection size
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config()?;
            } else {
                run_interactive_config()?;
            }
        }
        Commands::Index { url } => {
            index_repository(url).await?;
        }
        Commands::Ask { question, thread } => {
            ask_question(&question, thread.as_deref()).await?;
        }
        Commands::Summary => {
            show_summary().await?;
        }
        Commands::Chat { thread } => {
            run_chat(thread).await?;
        }
        Commands::Modules => {
            list_modules().await?;
        }
        Commands::Symbols { module } => {
            list_symbols(&module).await?;
        }
        Commands::Status => {
            show_status().await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    #[test]
    fn cli_parsing() {
        let cli = Cli::try_parse_from(["repo-chat", "modules"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            assert!(matches!(parsed.command, Commands::Modules));
        }
    }

    #[test]
    fn index_command_url_is_optional() {
        let cli = Cli::try_parse_from(["repo-chat", "index"]).expect("should parse");
        assert!(matches!(cli.command, Commands::Index { url: None }));

        let cli = Cli::try_parse_from(["repo-chat", "index", "https://github.com/example/project"])
            .expect("should parse");
        if let Commands::Index { url } = cli.command {
            assert_eq!(url.as_deref(), Some("https://github.com/example/project"));
        } else {
            panic!("expected index command");
        }
    }

    #[test]
    fn ask_command_with_thread() {
        let cli = Cli::try_parse_from([
            "repo-chat",
            "ask",
            "What does add do?",
            "--thread",
            "abc",
        ])
        .expect("should parse");

        if let Commands::Ask { question, thread } = cli.command {
            assert_eq!(question, "What does add do?");
            assert_eq!(thread.as_deref(), Some("abc"));
        } else {
            panic!("expected ask command");
        }
    }

    #[test]
    fn ask_requires_question() {
        let cli = Cli::try_parse_from(["repo-chat", "ask"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
        }
    }

    #[test]
    fn symbols_command_takes_module() {
        let cli = Cli::try_parse_from(["repo-chat", "symbols", "pkg"]).expect("should parse");
        if let Commands::Symbols { module } = cli.command {
            assert_eq!(module, "pkg");
        } else {
            panic!("expected symbols command");
        }
    }

    #[test]
    fn chat_thread_defaults_to_none() {
        let cli = Cli::try_parse_from(["repo-chat", "chat"]).expect("should parse");
        assert!(matches!(cli.command, Commands::Chat { thread: None }));
    }

    #[test]
    fn config_show_flag() {
        let cli = Cli::try_parse_from(["repo-chat", "config", "--show"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Config { show } = parsed.command {
                assert!(show);
            }
        }
    }

    #[test]
    fn invalid_command() {
        let cli = Cli::try_parse_from(["repo-chat", "serve"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::InvalidSubcommand);
        }
    }

    #[test]
    fn help_message() {
        let cli = Cli::try_parse_from(["repo-chat", "--help"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::DisplayHelp);
        }
    }
}
