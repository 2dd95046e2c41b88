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

//! Domain model, lifecycle state machine, and shared error/engine abstractions for the
//! torrent-to-cloud job pipeline.

mod background;
mod engine;
mod error;
mod model;
mod state;

pub use background::{BackgroundExecutionEngine, ExecutionDescription, ExecutionState, InMemoryBackgroundEngine};
pub use engine::{
    AddTorrent, EngineFile, EngineProgress, EngineState, EngineStatus, FilePriority,
    FileSelectionUpdate, RemoveTorrent, TorrentEngine, TorrentSource,
};
pub use error::{JobError, JobResult};
pub use model::{
    JobStatusHistoryEntry, JobType, PartETag, ProviderType, S3UploadProgress, StorageCredentials,
    UploadPartStatus, UserJob, UserStorageProfile, is_engine_metadata, path_is_selected,
};
pub use state::{JobSource, JobStatus};
