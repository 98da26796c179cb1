//! Live adapters for real external interactions.

pub mod anthropic;
pub mod claude_cli;
pub mod codex_cli;
pub mod filesystem;
pub mod shell;

use tracing::info;

use crate::config::Provider;
use crate::ports::{GenerationCapability, GenerationFuture, GenerationRequest};
use anthropic::AnthropicApi;
use claude_cli::ClaudeCli;
use codex_cli::CodexCli;

/// Picks the generation backend for `provider`.
///
/// `Auto` prefers the `claude` CLI on `PATH`, then the `codex` CLI, then
/// the API when a key is set. When nothing is usable the returned capability fails on first use,
/// so runs that never generate (checkpoint resume) still work.
#[must_use]
pub fn select_generator(provider: Provider) -> Box<dyn GenerationCapability> {
    match provider {
        Provider::ClaudeCli => match ClaudeCli::discover() {
            Some(cli) => Box::new(cli),
            None => Box::new(Unavailable::new("the `claude` CLI was not found on PATH")),
        },
        Provider::CodexCli => match CodexCli::discover() {
            Some(cli) => Box::new(cli),
            None => Box::new(Unavailable::new("the `codex` CLI was not found on PATH")),
        },
        Provider::AnthropicApi => Box::new(AnthropicApi::new()),
        Provider::Auto => {
            if let Some(cli) = ClaudeCli::discover() {
                info!(provider = "claude-cli", "generation backend selected");
                Box::new(cli)
            } else if let Some(cli) = CodexCli::discover() {
                info!(provider = "codex-cli", "generation backend selected");
                Box::new(cli)
            } else if AnthropicApi::has_key() {
                info!(provider = "anthropic-api", "generation backend selected");
                Box::new(AnthropicApi::new())
            } else {
                Box::new(Unavailable::new(
                    "no generation backend: install the `claude` or `codex` CLI, or set ANTHROPIC_API_KEY",
                ))
            }
        }
    }
}

/// Capability that always fails with a fixed reason.
pub struct Unavailable {
    reason: String,
}

impl Unavailable {
    /// Fails every call with `reason`.
    #[must_use]
    pub fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into() }
    }
}

impl GenerationCapability for Unavailable {
    fn generate(&self, _request: &GenerationRequest) -> GenerationFuture<'_> {
        let reason = self.reason.clone();
        Box::pin(async move { Err(reason.into()) })
    }
}
