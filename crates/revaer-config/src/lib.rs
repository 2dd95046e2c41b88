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
#![allow(unexpected_cfgs)]
#![allow(clippy::multiple_crate_versions)]

//! Environment-driven configuration for the job pipeline.
//!
//! Workers are configured once at process startup by reading a fixed set of
//! environment variables into a typed [`AppConfig`]. There is no runtime
//! settings store to coordinate with; changing behavior means restarting the
//! affected worker with new environment values.

mod error;
mod loader;
mod model;
mod validate;

pub use error::{ConfigError, ConfigResult};
pub use loader::{load, load_from};
pub use model::{AppConfig, BackblazeConfig, TelemetryConfig};
