//! Pause point between stage 1 and stage 2 for a human to vet the epics.

use std::io::{BufRead, Write};
use std::sync::Mutex;

use crate::error::{Error, Result};
use crate::hierarchy::{Epic, ProjectContext};

/// Inspects (and may trim) the epics produced by stage 1 before any task is
/// generated. Called synchronously at a stage boundary, when no generation
/// is in flight.
pub trait EpicReview: Send + Sync {
    /// Returns the epics to continue with.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`] when the reviewer aborts the run.
    fn review(&self, project: &ProjectContext, epics: Vec<Epic>) -> Result<Vec<Epic>>;
}

/// Line-oriented review on a terminal: Enter continues, `d <id>` drops an
/// epic, `q` aborts.
pub struct TerminalEpicReview {
    input: Mutex<Box<dyn BufRead + Send>>,
    output: Mutex<Box<dyn Write + Send>>,
}

impl TerminalEpicReview {
    /// Reviews on stdin/stderr.
    #[must_use]
    pub fn stdio() -> Self {
        Self::new(Box::new(std::io::BufReader::new(std::io::stdin())), Box::new(std::io::stderr()))
    }

    /// Reviews on the given streams.
    #[must_use]
    pub fn new(input: Box<dyn BufRead + Send>, output: Box<dyn Write + Send>) -> Self {
        Self { input: Mutex::new(input), output: Mutex::new(output) }
    }
}

impl EpicReview for TerminalEpicReview {
    fn review(&self, project: &ProjectContext, mut epics: Vec<Epic>) -> Result<Vec<Epic>> {
        let mut input = self.input.lock().map_err(|_| Error::Config("review input poisoned".into()))?;
        let mut output = self.output.lock().map_err(|_| Error::Config("review output poisoned".into()))?;

        loop {
            writeln!(output, "\n{}: {} epics", project.product_name, epics.len())?;
            for epic in &epics {
                let deps = if epic.depends_on.is_empty() {
                    String::new()
                } else {
                    format!(" (after {})", epic.depends_on.join(", "))
                };
                writeln!(output, "  [{}] {}{deps}", epic.temp_id, epic.title)?;
            }
            write!(output, "Enter to continue, 'd <id>' to drop an epic, 'q' to abort: ")?;
            output.flush()?;

            let mut line = String::new();
            if input.read_line(&mut line)? == 0 {
                return Ok(epics);
            }
            let command = line.trim();
            match command.split_once(' ') {
                None if command.is_empty() => return Ok(epics),
                None if command.eq_ignore_ascii_case("q") => return Err(Error::Cancelled),
                Some(("d", id)) => {
                    let id = id.trim();
                    if epics.len() == 1 {
                        writeln!(output, "Cannot drop the only epic.")?;
                    } else if let Some(position) = epics.iter().position(|epic| epic.temp_id == id) {
                        let dropped = epics.remove(position);
                        writeln!(output, "Dropped [{}] {}", dropped.temp_id, dropped.title)?;
                    } else {
                        writeln!(output, "No epic with id {id}.")?;
                    }
                }
                _ => writeln!(output, "Unrecognized input: {command}")?,
            }
        }
    }
}
