pub mod backends;
pub mod config;
pub mod research;
pub mod search;

use crate::cli::Cli;
use scout_core::{ScoutConfig, SearchService};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CommandError {
    #[error("{0}")]
    Core(#[from] scout_core::error::ConfigurationError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, CommandError>;

/// Load the config named by `--config` (or the default location) with
/// environment overrides applied.
pub fn load_config(cli: &Cli) -> Result<ScoutConfig> {
    Ok(ScoutConfig::load(cli.config.as_deref())?)
}

pub fn create_service(cli: &Cli) -> Result<SearchService> {
    Ok(SearchService::from_config(load_config(cli)?)?)
}
