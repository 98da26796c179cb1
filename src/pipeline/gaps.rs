//! Advisory gap check. Reports likely missing steps; never edits the tree.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::{call, prompts};
use crate::config::ParseConfig;
use crate::error::Result;
use crate::hierarchy::ParseResponse;
use crate::ports::{GenerationCapability, GenerationRequest, Purpose};

/// Findings of a gap check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GapReport {
    /// No blocking gaps were found.
    #[serde(default = "default_valid")]
    pub is_valid: bool,
    /// Blocking omissions.
    #[serde(default, deserialize_with = "crate::hierarchy::lenient::string_list")]
    pub gaps: Vec<String>,
    /// Things worth a second look.
    #[serde(default, deserialize_with = "crate::hierarchy::lenient::string_list")]
    pub warnings: Vec<String>,
}

fn default_valid() -> bool {
    true
}

/// Runs the advisory gap check.
pub struct GapValidator<'a> {
    capability: &'a dyn GenerationCapability,
    config: &'a ParseConfig,
    cancel: CancellationToken,
}

impl<'a> GapValidator<'a> {
    /// Creates a validator over `capability`.
    #[must_use]
    pub fn new(capability: &'a dyn GenerationCapability, config: &'a ParseConfig, cancel: CancellationToken) -> Self {
        Self { capability, config, cancel }
    }

    /// Summarizes `tree` and asks for missing practical steps.
    ///
    /// # Errors
    ///
    /// Returns capability, parse or cancellation errors. Callers treat them
    /// as advisory.
    pub async fn validate(&self, tree: &ParseResponse, document: &str) -> Result<GapReport> {
        let request = GenerationRequest {
            purpose: Purpose::Gaps,
            unit: None,
            model: self.config.model_for(Purpose::Gaps).to_string(),
            system: prompts::GAPS_SYSTEM.to_string(),
            prompt: prompts::gaps_prompt(&summarize(tree), document),
            max_tokens: self.config.max_tokens,
        };
        let mut report: GapReport = call::generate_json(self.capability, &request, &self.cancel).await?;
        if !report.gaps.is_empty() {
            report.is_valid = false;
        }
        info!(gaps = report.gaps.len(), warnings = report.warnings.len(), "gap check finished");
        Ok(report)
    }
}

/// Outline of the plan: titles, acceptance criteria and the tech stack.
#[must_use]
pub fn summarize(tree: &ParseResponse) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Project: {}", tree.project.product_name);
    if !tree.project.tech_stack.is_empty() {
        let _ = writeln!(out, "Tech stack: {}", tree.project.tech_stack.join(", "));
    }
    for epic in &tree.epics {
        let _ = writeln!(out, "\nEpic {}: {}", epic.temp_id, epic.title);
        for criterion in &epic.acceptance_criteria {
            let _ = writeln!(out, "  Acceptance: {criterion}");
        }
        for task in &epic.tasks {
            let _ = writeln!(out, "  Task {}: {}", task.temp_id, task.title);
            for subtask in &task.subtasks {
                let _ = writeln!(out, "    - {}: {}", subtask.temp_id, subtask.title);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn summary_lists_every_level_without_descriptions() {
        let tree: ParseResponse = serde_json::from_value(json!({
            "project": {"product_name": "Todo", "tech_stack": ["Rust", "SQLite"]},
            "epics": [{"temp_id": "1", "title": "Core", "acceptance_criteria": ["can add a todo"],
                       "tasks": [{"temp_id": "1.1", "title": "Store", "description": "secret detail",
                                  "subtasks": [{"temp_id": "1.1.1", "title": "Schema"}]}]}]
        }))
        .unwrap();

        let summary = summarize(&tree);
        assert!(summary.contains("Tech stack: Rust, SQLite"));
        assert!(summary.contains("Acceptance: can add a todo"));
        assert!(summary.contains("- 1.1.1: Schema"));
        assert!(!summary.contains("secret detail"));
    }

    #[test]
    fn single_string_gaps_decode_as_list() {
        let report: GapReport = serde_json::from_value(json!({"gaps": "no install step"})).unwrap();
        assert!(report.is_valid);
        assert_eq!(report.gaps, vec!["no install step"]);
    }
}
