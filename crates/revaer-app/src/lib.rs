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
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]

//! Revaer application bootstrap wiring.
//!
//! Layout: `bootstrap.rs` wires every collaborator together; `runner.rs` drives the real
//! download and upload-recovery work; `processors.rs` adapts the upload executors to the Redis
//! stream workers; `queue_dispatch.rs` hands newly queued jobs to the background engine;
//! `health_server.rs` serves the liveness endpoint; `request_file_resolver.rs` is the workspace's
//! only concrete `RequestFileResolver`.

/// Application bootstrap and environment loading.
pub mod bootstrap;
/// Errors that can abort process startup or a background task.
pub mod error;
/// Liveness HTTP endpoint.
pub mod health_server;
/// Stream job processors driving the upload executors.
pub mod processors;
/// Periodic dispatch of newly queued jobs to the background engine.
pub mod queue_dispatch;
/// HTTP-backed request-file resolver.
pub mod request_file_resolver;
/// Background-execution engine that actually runs download and upload-recovery work.
pub mod runner;

pub use bootstrap::run_app;
