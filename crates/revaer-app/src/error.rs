//! Application-level error type for process bootstrap.

use thiserror::Error;

/// Result alias for application bootstrap operations.
pub type AppResult<T> = Result<T, AppError>;

/// Errors that can abort process startup.
#[derive(Debug, Error)]
pub enum AppError {
    /// Configuration failed to load from the environment.
    #[error("configuration failed to load")]
    Config(#[from] revaer_config::ConfigError),
    /// The telemetry subsystem failed to initialize.
    #[error("telemetry initialization failed")]
    Telemetry(#[source] anyhow::Error),
    /// The Postgres connection pool could not be established or migrated.
    #[error("database initialization failed")]
    Database(#[from] revaer_data::DataError),
    /// The Redis connection manager could not be established.
    #[error("redis connection failed")]
    Redis(#[from] redis::RedisError),
    /// Building the Postgres pool itself failed, prior to handing it to `revaer-data`.
    #[error("database pool could not be created")]
    Pool(#[source] sqlx::Error),
    /// A background task (worker loop, signal handler) could not be driven to completion.
    #[error("background task failed")]
    Runtime(#[source] anyhow::Error),
}
