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

//! Bootstrap wiring and the coordinator main loop for the upload
//! rate-control daemon: ties `ratectl-core`'s algorithms to a
//! `ratectl-client` engine adapter, `ratectl-config`'s hot-reloadable
//! configuration, `ratectl-store`'s persistence, `ratectl-events`'s event
//! bus, and `ratectl-telemetry`'s logging/metrics.

pub mod bootstrap;
pub mod coordinator;
pub mod error;

pub use bootstrap::{run, run_once, BootstrapDependencies};
pub use coordinator::Coordinator;
pub use error::{AppError, AppResult};
