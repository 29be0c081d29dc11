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

//! Command-line entry point for the upload rate-control daemon.
//!
//! Grounded on the teacher's `clap` derive binary shape: a `Parser` struct
//! with a `--config` flag plus an optional `Subcommand`, a typed error with
//! an exit-code mapping, and a thin `main` that dispatches into the async
//! runtime and exits non-zero on failure.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

/// Upload rate-control daemon for private-tracker torrent clients.
#[derive(Debug, Parser)]
#[command(name = "ratectl", version, about)]
struct Cli {
    /// Path to the daemon's JSON configuration file.
    #[arg(long, default_value = "config.json")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

/// One-shot task selector; omitted entirely runs the coordinator as a
/// long-lived daemon until a termination signal arrives.
#[derive(Debug, Subcommand)]
enum Command {
    /// Runs exactly one coordinator tick against the configured client,
    /// then exits. Useful for cron invocation or manual debugging.
    Once,
}

/// Error surfaced to `main`, carrying the process exit code it maps to.
#[derive(Debug)]
enum CliError {
    Failure(ratectl_app::AppError),
}

impl CliError {
    const fn exit_code(&self) -> i32 {
        match self {
            Self::Failure(_) => 1,
        }
    }

    fn display_message(&self) -> String {
        match self {
            Self::Failure(err) => err.to_string(),
        }
    }
}

impl From<ratectl_app::AppError> for CliError {
    fn from(err: ratectl_app::AppError) -> Self {
        Self::Failure(err)
    }
}

type CliResult<T> = Result<T, CliError>;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(err) = run(cli).await {
        eprintln!("error: {}", err.display_message());
        process::exit(err.exit_code());
    }
}

async fn run(cli: Cli) -> CliResult<()> {
    match cli.command {
        Some(Command::Once) => ratectl_app::run_once(&cli.config).await?,
        None => ratectl_app::run(&cli.config).await?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_config_flag() {
        let cli = Cli::parse_from(["ratectl", "--config", "/etc/ratectl/config.json"]);
        assert_eq!(cli.config, PathBuf::from("/etc/ratectl/config.json"));
        assert!(cli.command.is_none());
    }

    #[test]
    fn cli_parses_once_subcommand() {
        let cli = Cli::parse_from(["ratectl", "once"]);
        assert!(matches!(cli.command, Some(Command::Once)));
    }

    #[test]
    fn cli_defaults_config_path() {
        let cli = Cli::parse_from(["ratectl"]);
        assert_eq!(cli.config, PathBuf::from("config.json"));
    }
}
