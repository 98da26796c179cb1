//! Process adapter using `std::process::Command`.

use std::process::Command;

use crate::ports::shell::{ShellExecutor, ShellOutput};

/// Runs programs directly, passing arguments as a vector.
pub struct LiveShellExecutor;

impl ShellExecutor for LiveShellExecutor {
    fn run(&self, program: &str, args: &[String]) -> Result<ShellOutput, Box<dyn std::error::Error + Send + Sync>> {
        let output = Command::new(program).args(args).output()?;
        Ok(ShellOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arguments_are_not_shell_interpreted() {
        let result = LiveShellExecutor.run("echo", &["$HOME; exit 3".to_string()]).unwrap();
        assert!(result.success());
        assert_eq!(result.stdout.trim(), "$HOME; exit 3");
    }

    #[test]
    fn missing_program_fails_to_spawn() {
        assert!(LiveShellExecutor.run("prd-parser-no-such-program", &[]).is_err());
    }
}
