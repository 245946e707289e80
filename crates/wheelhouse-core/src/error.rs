use thiserror::Error;

/// Errors from turning an order into a mission plan.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Order text is empty")]
    Empty,

    #[error("Order has no steps")]
    NoSteps,

    #[error("Malformed order: {0}")]
    Malformed(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors from loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration error: {0}")]
    Source(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
