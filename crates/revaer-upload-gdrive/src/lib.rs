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
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::multiple_crate_versions)]

//! Google Drive upload executor: resumable-session client, access-token refresh, and the
//! `ExecuteGoogleDriveUpload` envelope (lock, folder hierarchy, two-level dedup, throttled
//! progress reporting).

mod auth;
mod drive_client;
mod error;
mod executor;
mod resumable;

pub use auth::TokenRefresher;
pub use drive_client::DriveClient;
pub use error::{GDriveError, GDriveResult};
pub use executor::{GDriveExecutor, execute_upload, gdrive_upload_failure_status};
pub use resumable::{DriveFile, MIN_CHUNK_SIZE, ResumableUploadSession, UploadChunkResult, UploadStatus};
