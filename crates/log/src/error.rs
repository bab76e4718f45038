//! Logger error types

use thiserror::Error;

/// Result type for logger setup
pub type LogResult<T> = Result<T, LogError>;

/// Errors raised while building or reloading the logger
#[derive(Error, Debug)]
pub enum LogError {
    /// The filter directive string could not be parsed
    #[error("invalid log filter: {0}")]
    Filter(String),

    /// Configuration was rejected
    #[error("log configuration error: {0}")]
    Config(String),

    /// A global subscriber was already installed
    #[error("failed to install subscriber: {0}")]
    Init(String),
}
