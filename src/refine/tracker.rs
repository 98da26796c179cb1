//! Reads and updates created issues through the `bd` CLI.
//!
//! JSON output is preferred. When `bd` answers in its human-readable form
//! instead, the text is parsed for the fields refine needs.

use serde::Deserialize;
use tracing::debug;

use super::Issue;
use crate::error::{Error, Result};
use crate::ports::ShellExecutor;

const BD: &str = "bd";

/// `bd`-backed issue access.
pub struct BeadsTracker<'a> {
    shell: &'a dyn ShellExecutor,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    Many(Vec<Issue>),
    One(Issue),
}

impl<'a> BeadsTracker<'a> {
    /// Creates a tracker over `shell`.
    #[must_use]
    pub fn new(shell: &'a dyn ShellExecutor) -> Self {
        Self { shell }
    }

    /// Loads one issue with its description.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Tracker`] when `bd` fails or knows no such issue.
    pub fn show(&self, id: &str) -> Result<Issue> {
        let stdout = self.bd(&["show", id, "--json"])?;
        let issue = match serde_json::from_str::<OneOrMany>(stdout.trim()) {
            Ok(OneOrMany::One(issue)) => Some(issue),
            Ok(OneOrMany::Many(issues)) => issues.into_iter().find(|issue| issue.id == id),
            Err(err) => {
                debug!(id, error = %err, "bd show did not answer JSON, reading text");
                parse_show_text(id, &stdout)
            }
        };
        issue.ok_or_else(|| Error::Tracker(format!("issue {id} not found")))
    }

    /// Lists every issue regardless of status.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Tracker`] when `bd` fails.
    pub fn list(&self) -> Result<Vec<Issue>> {
        let stdout = self.bd(&["list", "--status=all", "--limit", "0", "--json"])?;
        match serde_json::from_str::<OneOrMany>(stdout.trim()) {
            Ok(OneOrMany::Many(issues)) => Ok(issues),
            Ok(OneOrMany::One(issue)) => Ok(vec![issue]),
            Err(err) => {
                debug!(error = %err, "bd list did not answer JSON, reading text");
                Ok(parse_list_text(&stdout))
            }
        }
    }

    /// Replaces the non-empty fields among `title` and `description`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Tracker`] when both are empty or `bd update` fails.
    pub fn update(&self, id: &str, title: &str, description: &str) -> Result<()> {
        let mut args = vec!["update", id];
        if !title.trim().is_empty() {
            args.extend(["--title", title]);
        }
        if !description.trim().is_empty() {
            args.extend(["--description", description]);
        }
        if args.len() == 2 {
            return Err(Error::Tracker(format!("correction for {id} was empty")));
        }
        self.bd(&args).map(|_| ())
    }

    fn bd(&self, args: &[&str]) -> Result<String> {
        let args: Vec<String> = args.iter().map(|arg| (*arg).to_string()).collect();
        let output = self
            .shell
            .run(BD, &args)
            .map_err(|e| Error::Tracker(format!("{BD} could not be started: {e}")))?;
        if output.success() {
            Ok(output.stdout)
        } else {
            let detail = if output.stderr.trim().is_empty() { output.stdout } else { output.stderr };
            Err(Error::Tracker(format!("{BD} {} failed: {}", args.join(" "), detail.trim())))
        }
    }
}

/// Issue kind implied by a readable id such as `prd-e1t2s3`.
#[must_use]
pub fn kind_from_id(id: &str) -> &'static str {
    let suffix = id.rsplit_once('-').map_or(id, |(_, suffix)| suffix);
    if suffix.contains('s') {
        "subtask"
    } else if suffix.contains('t') {
        "task"
    } else {
        "epic"
    }
}

/// Reads `bd show` text: a header line `○ <id> [EPIC] · <title> [...]`,
/// then sections such as `DESCRIPTION` and `PARENT`.
fn parse_show_text(id: &str, text: &str) -> Option<Issue> {
    let lines: Vec<&str> = text.lines().collect();
    let header = lines.first()?;
    let mut issue = Issue { id: id.to_string(), ..Issue::default() };

    if let Some((_, rest)) = header.split_once('·') {
        let title = rest.split_once('[').map_or(rest, |(title, _)| title);
        issue.title = title.trim().to_string();
    }
    issue.kind = if header.contains("[EPIC]") { "epic".to_string() } else { kind_from_id(id).to_string() };

    for (index, line) in lines.iter().enumerate() {
        if line.starts_with("DESCRIPTION") {
            let body: Vec<&str> = lines[index + 1..]
                .iter()
                .take_while(|next| !is_section_heading(next))
                .copied()
                .collect();
            issue.description = body.join("\n").trim().to_string();
        }
        if line.starts_with("PARENT") {
            issue.parent = lines[index + 1..]
                .iter()
                .find(|next| next.contains('→'))
                .and_then(|next| next.split_whitespace().find(|word| word.contains('-')))
                .map(|word| word.trim_end_matches(':').to_string());
        }
    }
    Some(issue)
}

fn is_section_heading(line: &str) -> bool {
    ["ACCEPTANCE", "LABELS", "DEPENDS", "CHILDREN", "BLOCKS", "PARENT"].iter().any(|heading| line.starts_with(heading))
}

/// Reads `bd list` text: one `○ <id> [...] - <title>` line per issue.
fn parse_list_text(text: &str) -> Vec<Issue> {
    text.lines()
        .filter(|line| line.starts_with('○'))
        .filter_map(|line| {
            let id = line.split_whitespace().nth(1)?;
            let title = line.split_once(" - ").map_or("", |(_, title)| title);
            Some(Issue {
                id: id.to_string(),
                title: title.trim().to_string(),
                kind: kind_from_id(id).to_string(),
                ..Issue::default()
            })
        })
        .collect()
}
