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

//! Pure, engine-agnostic upload rate-control algorithms: Kalman speed
//! estimation, windowed averaging, PID correction, adaptive quantisation,
//! process-wide precision tracking, per-torrent cycle/phase bookkeeping,
//! the download limiter, and the reannounce optimiser.
//!
//! Nothing in this crate touches the network, the filesystem, or the
//! clock directly; every entry point takes `now` as an explicit `f64`
//! parameter, which keeps the whole crate deterministically testable.

pub mod constants;
pub mod download_limiter;
pub mod phase;
pub mod pid;
pub mod precision;
pub mod quantizer;
pub mod rate_controller;
pub mod reannounce;
pub mod session;
pub mod speed;
pub mod state;
pub mod util;

pub use phase::Phase;
pub use precision::PrecisionTracker;
pub use rate_controller::{RateController, RateLimitInputs, RateLimitOutput};
pub use state::{CycleReport, Stats, TorrentState};
