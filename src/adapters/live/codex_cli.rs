//! Generation through the `codex` command-line client.
//!
//! Codex takes no separate system prompt, so both prompts travel together
//! on stdin. The child is killed when the returned future is dropped.

use std::path::PathBuf;
use std::process::Stdio;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::ports::generation::{GenerationCapability, GenerationFuture, GenerationRequest};

/// Program name looked up on `PATH`.
pub const CODEX_PROGRAM: &str = "codex";

/// Model sent when the request names a Claude model, which codex cannot serve.
pub const CODEX_DEFAULT_MODEL: &str = "o3";

/// Runs `codex --model <m> --quiet` once per request.
pub struct CodexCli {
    program: PathBuf,
}

impl CodexCli {
    /// Uses the given executable.
    #[must_use]
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self { program: program.into() }
    }

    /// Finds `codex` on `PATH`.
    #[must_use]
    pub fn discover() -> Option<Self> {
        which::which(CODEX_PROGRAM).ok().map(Self::new)
    }

    fn model(request: &GenerationRequest) -> &str {
        let model = request.model.trim();
        if model.is_empty() || model.starts_with("claude") {
            CODEX_DEFAULT_MODEL
        } else {
            model
        }
    }

    fn args(request: &GenerationRequest) -> Vec<String> {
        vec!["--model".to_string(), Self::model(request).to_string(), "--quiet".to_string()]
    }

    fn combined_prompt(request: &GenerationRequest) -> String {
        format!("SYSTEM INSTRUCTIONS:\n{}\n\nUSER REQUEST:\n{}", request.system, request.prompt)
    }
}

impl GenerationCapability for CodexCli {
    fn generate(&self, request: &GenerationRequest) -> GenerationFuture<'_> {
        let args = Self::args(request);
        let prompt = Self::combined_prompt(request);
        let purpose = request.purpose;

        Box::pin(async move {
            let mut child = Command::new(&self.program)
                .args(&args)
                .stdin(Stdio::piped())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true)
                .spawn()
                .map_err(|e| format!("failed to start {}: {e}", self.program.display()))?;

            if let Some(mut stdin) = child.stdin.take() {
                stdin
                    .write_all(prompt.as_bytes())
                    .await
                    .map_err(|e| format!("failed to send prompt to {CODEX_PROGRAM}: {e}"))?;
            }

            let output = child
                .wait_with_output()
                .await
                .map_err(|e| format!("{CODEX_PROGRAM} did not finish: {e}"))?;

            if !output.status.success() {
                let stderr = String::from_utf8_lossy(&output.stderr);
                return Err(format!("{CODEX_PROGRAM} CLI failed ({}): {}", output.status, stderr.trim()).into());
            }

            debug!(purpose = %purpose, bytes = output.stdout.len(), "codex call finished");
            Ok::<_, Box<dyn std::error::Error + Send + Sync>>(String::from_utf8_lossy(&output.stdout).into_owned())
        })
    }
}
