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

//! Administrative CLI for inspecting and requeuing jobs directly against the job store.
//!
//! Layout: `cli.rs` (argument parsing, command dispatch) and `output.rs` (table/JSON
//! rendering), with a thin `main.rs` that delegates to `run()`.

pub mod cli;
mod output;

pub use cli::run;
