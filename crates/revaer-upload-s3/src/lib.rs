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

//! S3-compatible upload executor: hand-rolled SigV4 request signing, a minimal multipart client,
//! and the `ExecuteS3Upload` envelope (lock, durable per-part progress, resume, cleanup).

mod error;
mod executor;
mod s3_client;
mod sigv4;

pub use error::{S3Error, S3Result};
pub use executor::{S3Executor, execute_upload, s3_upload_failure_status};
pub use s3_client::{S3Client, S3Config};
pub use sigv4::{SignedHeaders, encode_uri_path, sign_request};
