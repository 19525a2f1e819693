//! Layered configuration for `askd`.
//!
//! Priority, highest to lowest:
//! 1. Environment variables (`ASKD__` prefix, `__` as separator)
//! 2. `config/{env}.toml` (when `ASKD_ENV` or an explicit env is given)
//! 3. `config/default.toml`
//!
//! Intent/tier keyword lists for `QueryExpander` and `TaskRouter` are data,
//! loaded here as `RoutingConfig`/`IntentConfig` (spec §9 Open Question 2),
//! never hardcoded in the crates that consume them.

pub mod constants;
pub mod settings;

pub use settings::{
    load_settings, BreakerSettings, ConfidenceSettings, EmbeddingCacheSettings,
    EmbeddingSettings, IntentGroup, MemorySettings, RateLimitSettings, RerankSettings,
    ResponseCacheSettings, RoutingSettings, RuntimeEnvironment, SearchSettings, ServerSettings,
    Settings, TierChain,
};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    #[error("failed to parse configuration: {0}")]
    ParseError(String),

    #[error("missing required field: {0}")]
    MissingField(String),

    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("environment error: {0}")]
    Environment(String),
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}

impl From<ConfigError> for askd_core::error::Error {
    fn from(err: ConfigError) -> Self {
        askd_core::error::Error::Configuration(err.to_string())
    }
}
