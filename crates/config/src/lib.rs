//! Configuration management for the voicebot
//!
//! Supports loading configuration from:
//! - `config/default.*` and `config/{env}.*` files (any format the `config` crate reads)
//! - Environment variables (`VOICEBOT__` prefix, `__` separator)
//! - `OPENAI_API_KEY` as a fallback for the service credentials

pub mod agent;
pub mod settings;

pub use agent::AgentConfig;
pub use settings::{
    load_settings, load_settings_from, ObservabilityConfig, PipelineSettings, ServerConfig,
    ServicesConfig, Settings, TransportConfig,
};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}

impl From<ConfigError> for voicebot_core::Error {
    fn from(err: ConfigError) -> Self {
        voicebot_core::Error::Config(err.to_string())
    }
}
