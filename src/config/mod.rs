// Configuration management module
// TOML settings file plus environment overrides for the provider credential and models

pub mod interactive;
pub mod settings;


pub use interactive::{run_interactive_config, show_config};
pub use settings::{
    ApiKey, Config, ConfigError, GeminiConfig, PathsConfig, RetrievalConfig,
};
