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

//! Download worker: resolves a job's torrent descriptor, drives a [`TorrentEngine`] to
//! completion, and hands off to the upload stream once content lands on disk.
//!
//! [`TorrentEngine`]: revaer_jobs_core::TorrentEngine

mod engine;
mod error;
mod resolver;
mod store;
mod worker;

pub use engine::{ManifestFile, SimulatedEngine};
pub use error::{DownloadError, DownloadResult};
pub use resolver::{RequestFileResolver, ResolvedRequestFile, materialize};
pub use store::{FastResumeState, FastResumeStore};
pub use worker::{DownloadContext, UploadTrigger, download_failure_status, execute_download};
