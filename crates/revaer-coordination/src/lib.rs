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

//! Redis-backed coordination fabric shared by the download and upload executors: dispatch
//! streams with a reclaim-on-idle worker loop, distributed locks for at-most-one-executor
//! enforcement, and a small sanitized-key cache.

mod cache;
mod dispatcher;
mod error;
mod lock;
mod stream;

pub use cache::{Cache, sanitize_key};
pub use dispatcher::{DispatchJob, JobProcessor, RECLAIM_IDLE_MS, StreamDispatcher, StreamWorker};
pub use error::{CoordinationError, CoordinationResult};
pub use lock::{Lock, LockManager};
pub use stream::StreamEntry;
