//! Configuration management for the voice buddy
//!
//! Supports loading configuration from:
//! - `config/default.{toml,yaml}` and `config/{env}.{toml,yaml}`
//! - An explicit file passed on the command line
//! - Environment variables (`VOICE_BUDDY__` prefix, `__` separator)
//!
//! Every field carries a serde default, so a missing file yields a usable
//! configuration. `Settings::validate` reports all violated preconditions
//! at once.

pub mod settings;
pub mod agent;
pub mod io;

pub use settings::{
    Settings, PersistenceConfig, PersistenceBackend, ObservabilityConfig, load_settings,
};
pub use agent::{AgentConfig, ToolConfig, LlmConfig, LlmProvider, ParseRecovery};
pub use io::{InputConfig, InputMode, OutputConfig};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Invalid configuration:\n  - {}", .0.join("\n  - "))]
    Invalid(Vec<String>),
}

impl ConfigError {
    /// Individual problems, one per violated precondition
    pub fn problems(&self) -> Vec<String> {
        match self {
            ConfigError::Invalid(problems) => problems.clone(),
            other => vec![other.to_string()],
        }
    }
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}

impl From<ConfigError> for voice_buddy_core::Error {
    fn from(err: ConfigError) -> Self {
        voice_buddy_core::Error::Config(err.to_string())
    }
}
