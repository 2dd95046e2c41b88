#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::cargo,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]

//! Shared data access layer for the job pipeline: migrations and repositories over a Postgres
//! `revaer_jobs` schema.

pub mod error;
mod jobs;
mod s3_progress;
mod storage_profiles;
mod store;

pub use error::{DataError, Result as DataResult};
pub use jobs::{HistoryRepository, JobsRepository, record_transition};
pub use s3_progress::S3ProgressRepository;
pub use storage_profiles::StorageProfilesRepository;
pub use store::DataStore;
