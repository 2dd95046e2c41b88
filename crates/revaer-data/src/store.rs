//! Top-level data store: pool ownership, migrations, and repository accessors.

use sqlx::{PgPool, Postgres, Transaction};

use crate::error::{DataError, Result};
use crate::jobs::{HistoryRepository, JobsRepository};
use crate::s3_progress::S3ProgressRepository;
use crate::storage_profiles::StorageProfilesRepository;

/// Database-backed store for the job pipeline's persisted state.
///
/// Cheaply cloneable: wraps a `PgPool`. Repository accessors borrow the shared pool; the
/// heartbeat loop should construct its own `DataStore` clone so its writes use a separate
/// connection-pool checkout from the main execution path.
#[derive(Clone)]
pub struct DataStore {
    pool: PgPool,
}

impl DataStore {
    /// Initialize the data store, applying pending migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if migrations fail or the database is unreachable.
    pub async fn new(pool: PgPool) -> Result<Self> {
        let mut migrator = sqlx::migrate!("./migrations");
        migrator.set_ignore_missing(true);
        migrator
            .run(&pool)
            .await
            .map_err(|source| DataError::MigrationFailed { source })?;
        tracing::info!("revaer-data migrations applied");
        Ok(Self { pool })
    }

    /// Access the underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Repository for `UserJob` rows.
    #[must_use]
    pub const fn jobs(&self) -> JobsRepository<'_> {
        JobsRepository::new(&self.pool)
    }

    /// Repository for `JobStatusHistory` rows.
    #[must_use]
    pub const fn history(&self) -> HistoryRepository<'_> {
        HistoryRepository::new(&self.pool)
    }

    /// Repository for `UserStorageProfile` rows.
    #[must_use]
    pub const fn storage_profiles(&self) -> StorageProfilesRepository<'_> {
        StorageProfilesRepository::new(&self.pool)
    }

    /// Repository for `S3UploadProgress` rows.
    #[must_use]
    pub const fn s3_progress(&self) -> S3ProgressRepository<'_> {
        S3ProgressRepository::new(&self.pool)
    }

    /// Start a transaction batching several writes, e.g. a status transition plus its history
    /// entry.
    ///
    /// # Errors
    ///
    /// Returns an error if a connection cannot be checked out.
    pub async fn transaction(&self) -> Result<Transaction<'static, Postgres>> {
        self.pool.begin().await.map_err(crate::error::query_failed("begin transaction"))
    }
}
