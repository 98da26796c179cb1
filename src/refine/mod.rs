//! Corrects a created issue from user feedback and carries the correction
//! to related issues.
//!
//! One analysis call names the wrong and the correct concepts and rewrites
//! the target. Related issues are its descendants (by readable id or parent
//! link) and, optionally, any issue whose text mentions a wrong concept.
//! Each related issue gets its own correction call. Failures on related
//! issues are reported and skipped; only cancellation stops the run.

pub mod prompts;
pub mod tracker;

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::DEFAULT_MAX_TOKENS;
use crate::error::Result;
use crate::pipeline::call;
use crate::ports::{GenerationCapability, GenerationRequest, Purpose, ShellExecutor};
use tracker::BeadsTracker;

/// An issue as the tracker reports it.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Issue {
    /// Readable id, e.g. `prd-e2t1`.
    #[serde(default, deserialize_with = "crate::hierarchy::lenient::or_default")]
    pub id: String,
    /// Title.
    #[serde(default, deserialize_with = "crate::hierarchy::lenient::or_default")]
    pub title: String,
    /// Description.
    #[serde(default, deserialize_with = "crate::hierarchy::lenient::or_default")]
    pub description: String,
    /// `epic`, `task` or `subtask`.
    #[serde(default, rename = "type", alias = "issue_type", deserialize_with = "crate::hierarchy::lenient::or_default")]
    pub kind: String,
    /// Parent issue id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    /// Tracker status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

/// What the analysis call returns. Correction calls fill only the
/// corrected fields.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Analysis {
    /// Phrases that misframe the issue.
    #[serde(default, deserialize_with = "crate::hierarchy::lenient::string_list")]
    pub wrong_concepts: Vec<String>,
    /// Their replacements.
    #[serde(default, deserialize_with = "crate::hierarchy::lenient::string_list")]
    pub correct_concepts: Vec<String>,
    /// Rewritten title.
    #[serde(default, deserialize_with = "crate::hierarchy::lenient::or_default")]
    pub corrected_title: String,
    /// Rewritten description.
    #[serde(default, deserialize_with = "crate::hierarchy::lenient::or_default")]
    pub corrected_description: String,
}

/// Inputs of one refine run.
#[derive(Debug, Clone, Default)]
pub struct RefineRequest {
    /// Issue to correct.
    pub issue_id: String,
    /// What is wrong with it.
    pub feedback: String,
    /// PRD text used as grounding.
    pub document: Option<String>,
    /// Also correct the issue's descendants.
    pub cascade: bool,
    /// Also correct any issue that mentions a wrong concept.
    pub scan_all: bool,
    /// Analyze and list, but change nothing.
    pub dry_run: bool,
}

/// An issue that could not be corrected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedUpdate {
    /// Issue id.
    pub id: String,
    /// Why.
    pub reason: String,
}

/// Outcome of a refine run.
#[derive(Debug, Clone, PartialEq)]
pub struct RefineReport {
    /// The issue as loaded before correction.
    pub target: Issue,
    /// Analysis of the target.
    pub analysis: Analysis,
    /// Related issues selected for correction, target excluded.
    pub affected: Vec<Issue>,
    /// Ids updated in the tracker, target first when it succeeded.
    pub updated: Vec<String>,
    /// Ids that could not be corrected.
    pub failed: Vec<FailedUpdate>,
}

/// Runs refine against a generation capability and the `bd` tracker.
pub struct Refiner<'a> {
    capability: &'a dyn GenerationCapability,
    tracker: BeadsTracker<'a>,
    model: String,
    cancel: CancellationToken,
}

impl<'a> Refiner<'a> {
    /// Creates a refiner. Calls go to `model`.
    #[must_use]
    pub fn new(
        capability: &'a dyn GenerationCapability,
        shell: &'a dyn ShellExecutor,
        model: impl Into<String>,
        cancel: CancellationToken,
    ) -> Self {
        Self { capability, tracker: BeadsTracker::new(shell), model: model.into(), cancel }
    }

    /// Analyzes the target, selects related issues and, unless dry-running,
    /// writes every correction back.
    ///
    /// # Errors
    ///
    /// Returns tracker errors while loading, analysis errors, and
    /// [`crate::error::Error::Cancelled`]. Failed updates are reported in
    /// the [`RefineReport`] instead.
    pub async fn refine(&self, request: &RefineRequest) -> Result<RefineReport> {
        let target = self.tracker.show(&request.issue_id)?;
        info!(issue = %target.id, title = %target.title, "issue loaded");
        let issues = self.tracker.list()?;
        debug!(issues = issues.len(), "tracker listed");

        let analysis = self.analyze(&target, &request.feedback, request.document.as_deref()).await?;
        info!(wrong = analysis.wrong_concepts.len(), "misalignment identified");

        let affected = affected_issues(&issues, &target.id, &analysis.wrong_concepts, request.cascade, request.scan_all);
        let mut report = RefineReport { target, analysis, affected, updated: Vec::new(), failed: Vec::new() };
        if request.dry_run {
            return Ok(report);
        }

        let target_id = report.target.id.clone();
        let outcome =
            self.tracker.update(&target_id, &report.analysis.corrected_title, &report.analysis.corrected_description);
        record(&mut report, target_id, outcome);

        for issue in report.affected.clone() {
            let full = self.tracker.show(&issue.id).unwrap_or_else(|err| {
                debug!(issue = %issue.id, error = %err, "using listed fields");
                issue.clone()
            });
            let outcome = match self.correct(&full, &report.analysis).await {
                Ok(correction) => {
                    self.tracker.update(&full.id, &correction.corrected_title, &correction.corrected_description)
                }
                Err(err) if err.is_cancelled() => return Err(err),
                Err(err) => Err(err),
            };
            record(&mut report, issue.id, outcome);
        }

        info!(updated = report.updated.len(), failed = report.failed.len(), "refine finished");
        Ok(report)
    }

    async fn analyze(&self, issue: &Issue, feedback: &str, document: Option<&str>) -> Result<Analysis> {
        let request = self.request(
            Purpose::Analyze,
            &issue.id,
            prompts::ANALYZE_SYSTEM,
            prompts::analyze_prompt(issue, feedback, document),
        );
        call::generate_json(self.capability, &request, &self.cancel).await
    }

    async fn correct(&self, issue: &Issue, analysis: &Analysis) -> Result<Analysis> {
        let request =
            self.request(Purpose::Correct, &issue.id, prompts::CORRECT_SYSTEM, prompts::correct_prompt(issue, analysis));
        call::generate_json(self.capability, &request, &self.cancel).await
    }

    fn request(&self, purpose: Purpose, unit: &str, system: &str, prompt: String) -> GenerationRequest {
        GenerationRequest {
            purpose,
            unit: Some(unit.to_string()),
            model: self.model.clone(),
            system: system.to_string(),
            prompt,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }
}

fn record(report: &mut RefineReport, id: String, outcome: Result<()>) {
    match outcome {
        Ok(()) => report.updated.push(id),
        Err(err) => {
            warn!(issue = %id, error = %err, "issue not corrected");
            report.failed.push(FailedUpdate { id, reason: err.to_string() });
        }
    }
}

/// True when `issue` sits below `parent_id`: its parent link names it, or
/// its readable id extends it with a task or subtask marker.
#[must_use]
pub fn is_descendant(issue: &Issue, parent_id: &str) -> bool {
    if issue.id == parent_id {
        return false;
    }
    issue.parent.as_deref() == Some(parent_id)
        || issue.id.strip_prefix(parent_id).is_some_and(|rest| rest.starts_with(['t', 's']))
}

/// True when the title or description mentions any concept, ignoring case.
#[must_use]
pub fn mentions_any(issue: &Issue, concepts: &[String]) -> bool {
    let text = format!("{} {}", issue.title, issue.description).to_lowercase();
    concepts
        .iter()
        .map(|concept| concept.trim().to_lowercase())
        .any(|concept| !concept.is_empty() && text.contains(&concept))
}

/// Related issues in tracker order: descendants first when `cascade`, then
/// mentions of a wrong concept when `scan_all`. The target and repeats are
/// left out.
#[must_use]
pub fn affected_issues(
    issues: &[Issue],
    target_id: &str,
    wrong_concepts: &[String],
    cascade: bool,
    scan_all: bool,
) -> Vec<Issue> {
    let mut seen = HashSet::from([target_id.to_string()]);
    let descendants = issues.iter().filter(|issue| cascade && is_descendant(issue, target_id));
    let mentions = issues.iter().filter(|issue| scan_all && mentions_any(issue, wrong_concepts));

    descendants.chain(mentions).filter(|issue| seen.insert(issue.id.clone())).cloned().collect()
}
