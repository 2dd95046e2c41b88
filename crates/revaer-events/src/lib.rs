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
#![allow(unexpected_cfgs)]

//! In-process event bus for the job pipeline.
//!
//! The bus provides a typed event enum, sequential identifiers, and support for
//! replaying recent events when subscribers reconnect. Internally it uses
//! `tokio::broadcast` with a bounded buffer; when the channel overflows, the
//! oldest events are dropped, matching the desired backpressure behaviour.
//!
//! This crate only fans events out within a single worker process (e.g. a
//! download worker's monitor loop notifying an in-process health reporter). It
//! is not the durable, cross-process coordination fabric used to hand jobs from
//! the download worker to the upload dispatchers; that is `revaer-coordination`.

pub mod error;
pub mod payloads;
pub mod routing;
pub mod topics;

pub use error::{EventBusError, EventBusResult};
pub use payloads::{Event, EventEnvelope, EventId, Provider};
pub use routing::{EventBus, EventStream};
pub use topics::event_kind;
