//! Command dispatch and handlers.

pub mod parse;
pub mod refine;

use std::env;
use std::path::PathBuf;

use tokio_util::sync::CancellationToken;

use crate::cli::Command;
use crate::config::Provider;
use crate::context::ServiceContext;
use crate::error::Result;

/// Records every generation call to the cassette file it names.
pub const RECORD_VAR: &str = "PRD_PARSER_RECORD";

/// Serves generation calls from the cassette file it names.
pub const REPLAY_VAR: &str = "PRD_PARSER_REPLAY";

/// Dispatch a parsed command to its handler.
///
/// # Errors
///
/// Returns an error if the selected command handler fails.
pub async fn dispatch(command: &Command, cancel: CancellationToken) -> Result<()> {
    match command {
        Command::Parse(args) => parse::run(args, cancel).await,
        Command::Refine(args) => refine::run(args, cancel).await,
    }
}

/// Builds the service context for a run.
///
/// `PRD_PARSER_REPLAY` takes precedence over `PRD_PARSER_RECORD`; with
/// neither set, generation goes to the live backend for `provider`.
///
/// # Errors
///
/// Returns an error if a replay cassette cannot be loaded.
pub fn service_context(provider: Provider) -> Result<ServiceContext> {
    if let Some(path) = env_path(REPLAY_VAR) {
        return ServiceContext::replaying(&path);
    }
    if let Some(path) = env_path(RECORD_VAR) {
        return Ok(ServiceContext::recording(provider, &path));
    }
    Ok(ServiceContext::live(provider))
}

fn env_path(var: &str) -> Option<PathBuf> {
    env::var_os(var).filter(|value| !value.is_empty()).map(PathBuf::from)
}
