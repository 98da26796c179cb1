//! Process port for driving external command-line tools.

use std::error::Error;

/// Captured result of a finished process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShellOutput {
    /// Exit code; `-1` when the process was killed by a signal.
    pub exit_code: i32,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

impl ShellOutput {
    /// True when the process exited with code 0.
    #[must_use]
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs a program with an argument vector, without a shell in between.
pub trait ShellExecutor: Send + Sync {
    /// Runs `program` with `args` and waits for it to finish.
    ///
    /// # Errors
    ///
    /// Returns an error if the program cannot be spawned.
    fn run(&self, program: &str, args: &[String]) -> Result<ShellOutput, Box<dyn Error + Send + Sync>>;
}
