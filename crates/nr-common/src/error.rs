//! Configuration error types.
//!
//! Configuration errors are never recovered internally: a malformed trigger
//! specification surfaces synchronously to whoever asked for it. The other
//! variants are produced by the option parsers in `nr-core` and are usually
//! downgraded to warnings by the startup loader.

use thiserror::Error;

/// Result type alias for configuration parsing.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors raised while parsing report configuration values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("unrecognised trigger token: {0:?}")]
    InvalidTriggerToken(String),

    #[error("unrecognised signal: {0:?}")]
    InvalidSignal(String),

    #[error("unrecognised value for {option} switch: {value:?}")]
    InvalidSwitch { option: String, value: String },

    #[error("value for {option} too long (max {max} characters)")]
    ValueTooLong { option: String, max: usize },

    #[error("missing value for {option}")]
    MissingValue { option: String },
}

impl ConfigError {
    /// Stable code for structured error reporting.
    pub fn code(&self) -> u32 {
        match self {
            ConfigError::InvalidTriggerToken(_) => 40,
            ConfigError::InvalidSignal(_) => 41,
            ConfigError::InvalidSwitch { .. } => 42,
            ConfigError::ValueTooLong { .. } => 43,
            ConfigError::MissingValue { .. } => 44,
        }
    }
}
