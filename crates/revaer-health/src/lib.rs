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

//! Periodic sweep for jobs whose download or upload phase has gone quiet, and
//! background-execution-engine-aware recovery for them.

mod error;
mod monitor;

pub use error::{HealthError, HealthResult};
pub use monitor::{HealthMonitor, run, run_once};
