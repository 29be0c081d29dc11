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

//! Logging initialisation and Prometheus metrics for the rate-control
//! daemon.

pub mod init;
pub mod metrics;

pub use init::{build_sha, init_logging, LogFormat, LoggingConfig, DEFAULT_LOG_LEVEL};
pub use metrics::{Metrics, MetricsSnapshot};
