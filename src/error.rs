use thiserror::Error;

use crate::models::Signal;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("{signal} provider failed for {category}: {source}")]
    ProviderFailure {
        signal: Signal,
        category: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Persistence error: {0}")]
    Persistence(#[source] anyhow::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Unknown category: {0}")]
    UnknownCategory(String),
}

impl EngineError {
    pub fn provider(signal: Signal, category: &str) -> impl FnOnce(anyhow::Error) -> Self + '_ {
        move |source| EngineError::ProviderFailure {
            signal,
            category: category.to_string(),
            source,
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
