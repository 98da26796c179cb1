//! Core library entry for the `prd-parser` CLI.
//!
//! A product requirements document goes in; a validated epic, task and
//! subtask hierarchy comes out and is handed to a sink. Generation runs
//! either as one call or as three bounded fan-out stages.

pub mod adapters;
pub mod cassette;
pub mod cli;
pub mod commands;
pub mod config;
pub mod context;
pub mod error;
pub mod extract;
pub mod hierarchy;
pub mod pipeline;
pub mod ports;
pub mod refine;
pub mod sink;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info_span, warn, Instrument};

use crate::error::{Error, Result};

/// Run the CLI with the provided arguments.
///
/// # Errors
///
/// Returns [`Error::Usage`] when argument parsing fails, otherwise whatever
/// the command returns.
pub fn run<I, T>(args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    let cli = cli::Cli::try_parse_from(args).map_err(|err| Error::Usage(err.to_string()))?;
    execute(&cli)
}

/// Runs a parsed command on a current-thread runtime. Ctrl-C cancels the
/// run.
///
/// # Errors
///
/// Returns whatever the command returns.
pub fn execute(cli: &cli::Cli) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build()?;
    let cancel = CancellationToken::new();
    let span = info_span!("run", id = %uuid::Uuid::new_v4());

    runtime.block_on(async {
        let on_interrupt = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupted, cancelling");
                on_interrupt.cancel();
            }
        });
        commands::dispatch(&cli.command, cancel).instrument(span).await
    })
}

#[cfg(test)]
mod tests {
    use super::run;

    #[test]
    fn run_errors_on_unknown_subcommand() {
        let err = run(["prd-parser", "unknown"]).unwrap_err();
        assert_eq!(err.code(), "E_USAGE");
    }

    #[test]
    fn run_requires_a_document() {
        let err = run(["prd-parser", "parse"]).unwrap_err();
        assert!(err.to_string().contains("PRD_FILE"));
    }
}
