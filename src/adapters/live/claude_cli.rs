//! Generation through the `claude` command-line client.
//!
//! The system prompt goes in a temporary file, the user prompt on stdin.
//! The child is killed when the returned future is dropped.

use std::path::PathBuf;
use std::process::Stdio;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::ports::generation::{GenerationCapability, GenerationFuture, GenerationRequest};

/// Program name looked up on `PATH`.
pub const CLAUDE_PROGRAM: &str = "claude";

/// Runs `claude --print --output-format json` once per request.
pub struct ClaudeCli {
    program: PathBuf,
}

impl ClaudeCli {
    /// Uses the given executable.
    #[must_use]
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self { program: program.into() }
    }

    /// Finds `claude` on `PATH`.
    #[must_use]
    pub fn discover() -> Option<Self> {
        which::which(CLAUDE_PROGRAM).ok().map(Self::new)
    }

    fn args(request: &GenerationRequest, system_file: &str) -> Vec<String> {
        [
            "--model",
            request.model.as_str(),
            "--system-prompt-file",
            system_file,
            "--print",
            "--output-format",
            "json",
            "--tools",
            "",
            "--no-session-persistence",
        ]
        .iter()
        .map(|arg| (*arg).to_string())
        .collect()
    }
}

/// Temporary file removed on drop, including when the call is cancelled.
struct TempPrompt {
    path: PathBuf,
}

impl TempPrompt {
    fn write(contents: &str) -> std::io::Result<Self> {
        let path = std::env::temp_dir().join(format!("prd-parser-system-{}.txt", uuid::Uuid::new_v4()));
        std::fs::write(&path, contents)?;
        Ok(Self { path })
    }
}

impl Drop for TempPrompt {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

impl GenerationCapability for ClaudeCli {
    fn generate(&self, request: &GenerationRequest) -> GenerationFuture<'_> {
        let request = request.clone();

        Box::pin(async move {
            let system = TempPrompt::write(&request.system)
                .map_err(|e| format!("failed to write system prompt file: {e}"))?;
            let args = Self::args(&request, &system.path.to_string_lossy());

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
                    .write_all(request.prompt.as_bytes())
                    .await
                    .map_err(|e| format!("failed to send prompt to {CLAUDE_PROGRAM}: {e}"))?;
            }

            let output = child
                .wait_with_output()
                .await
                .map_err(|e| format!("{CLAUDE_PROGRAM} did not finish: {e}"))?;
            drop(system);

            if !output.status.success() {
                let stderr = String::from_utf8_lossy(&output.stderr);
                return Err(format!("{CLAUDE_PROGRAM} CLI failed ({}): {}", output.status, stderr.trim()).into());
            }

            debug!(purpose = %request.purpose, bytes = output.stdout.len(), "claude call finished");
            Ok::<_, Box<dyn std::error::Error + Send + Sync>>(String::from_utf8_lossy(&output.stdout).into_owned())
        })
    }
}
