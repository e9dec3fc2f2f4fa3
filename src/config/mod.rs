// Configuration management module
// TOML settings in the data directory, overridable from the environment

pub mod interactive;
pub mod settings;


pub use interactive::{run_interactive_config, show_config};
pub use settings::{ChatConfig, Config, ConfigError, FALLBACK_ANSWER, IndexConfig, ProviderConfig};
