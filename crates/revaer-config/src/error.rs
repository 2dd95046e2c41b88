//! Error types for configuration loading.

use thiserror::Error;

/// Primary error type for configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required environment variable was not set.
    #[error("missing required environment variable '{name}'")]
    MissingVar {
        /// Name of the missing variable.
        name: &'static str,
    },
    /// An environment variable was set but failed to parse or validate.
    #[error("invalid value for '{name}': {reason}")]
    InvalidValue {
        /// Name of the offending variable.
        name: &'static str,
        /// Machine-readable reason for the failure.
        reason: String,
    },
}

/// Convenience alias for configuration results.
pub type ConfigResult<T> = Result<T, ConfigError>;
