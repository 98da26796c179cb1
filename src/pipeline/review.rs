//! Structural review: a cheap pass proposes structure, the original keeps
//! its content.
//!
//! The reviewer only ever sees a skeleton (ids, titles, dependency edges),
//! so its answer lacks descriptions, testing and subtasks. The merge walks
//! the reviewed skeleton for order and edges and pulls every matching item's
//! content from the original tree. If the merged tree does not validate, the
//! original is returned untouched.

use std::collections::{HashMap, VecDeque};

use serde::Deserialize;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::{call, prompts};
use crate::config::ParseConfig;
use crate::error::Result;
use crate::hierarchy::{Epic, ParseResponse, ProjectContext, Task};
use crate::ports::{GenerationCapability, GenerationRequest, Purpose};

/// Notes value meaning the reviewer found nothing to change.
pub const NO_CHANGES: &str = "No changes needed";

/// What the reviewer sends back.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReviewedSkeleton {
    /// Free-text summary of the changes.
    #[serde(default, deserialize_with = "crate::hierarchy::lenient::or_default")]
    pub review_notes: String,
    /// Project as the reviewer saw it; only its product name and tech stack
    /// are merged.
    #[serde(default)]
    pub project: Option<ProjectContext>,
    /// Epics in their reviewed order.
    #[serde(default, deserialize_with = "crate::hierarchy::lenient::or_default")]
    pub epics: Vec<Epic>,
}

/// Result of a review pass.
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewOutcome {
    /// Merged tree, or the original when the merge was rejected.
    pub tree: ParseResponse,
    /// Whether the returned tree differs from the input by intent.
    pub was_modified: bool,
    /// Reviewer notes or a diagnostic about a rejected merge.
    pub notes: String,
}

/// Asks the capability to repair cross-cutting structure.
pub struct StructuralReviewer<'a> {
    capability: &'a dyn GenerationCapability,
    config: &'a ParseConfig,
    cancel: CancellationToken,
}

impl<'a> StructuralReviewer<'a> {
    /// Creates a reviewer over `capability`.
    #[must_use]
    pub fn new(capability: &'a dyn GenerationCapability, config: &'a ParseConfig, cancel: CancellationToken) -> Self {
        Self { capability, config, cancel }
    }

    /// Sends the skeleton of `tree` for review and merges the answer.
    ///
    /// # Errors
    ///
    /// Returns capability, parse or cancellation errors from the review
    /// call. A merge that fails validation is not an error.
    pub async fn review_and_fix(&self, tree: &ParseResponse, document: &str) -> Result<ReviewOutcome> {
        let skeleton = serde_json::to_string_pretty(&skeleton_of(tree))?;
        let request = GenerationRequest {
            purpose: Purpose::Review,
            unit: None,
            model: self.config.model_for(Purpose::Review).to_string(),
            system: prompts::REVIEW_SYSTEM.to_string(),
            prompt: prompts::review_prompt(&skeleton, &tree.project.tech_stack, document),
            max_tokens: self.config.max_tokens,
        };

        let reviewed: ReviewedSkeleton = call::generate_json(self.capability, &request, &self.cancel).await?;
        let outcome = merge_reviewed(tree, reviewed);
        info!(was_modified = outcome.was_modified, notes = %outcome.notes, "structural review finished");
        Ok(outcome)
    }
}

/// Lightweight projection sent to the reviewer: ids, titles, edges.
#[must_use]
pub fn skeleton_of(tree: &ParseResponse) -> serde_json::Value {
    let epics: Vec<serde_json::Value> = tree
        .epics
        .iter()
        .map(|epic| {
            let tasks: Vec<serde_json::Value> = epic
                .tasks
                .iter()
                .map(|task| json!({"temp_id": task.temp_id, "title": task.title, "depends_on": task.depends_on}))
                .collect();
            json!({"temp_id": epic.temp_id, "title": epic.title, "depends_on": epic.depends_on, "tasks": tasks})
        })
        .collect();
    json!({
        "project": {"product_name": tree.project.product_name, "tech_stack": tree.project.tech_stack},
        "epics": epics,
    })
}

/// Overlays reviewed structure onto original content.
///
/// Matching ids start from the original item and take only the reviewed
/// title (when non-empty) and dependency edges. Epics match by id in order,
/// so the k-th reviewed epic with an id meets the k-th original one. Tasks
/// match within their matched epic first, then anywhere in the tree when
/// the id is unique there. Unknown ids are accepted as sent. A reviewed
/// epic without tasks keeps its original tasks. Of the project only the
/// product name and tech stack are taken, and only when non-empty.
#[must_use]
pub fn merge_reviewed(original: &ParseResponse, reviewed: ReviewedSkeleton) -> ReviewOutcome {
    let notes = reviewed.review_notes.trim().to_string();
    let was_modified = !notes.is_empty() && notes != NO_CHANGES;

    let mut original_epics = ByOccurrence::new(original.epics.iter().map(|epic| (epic.temp_id.as_str(), epic)));
    let mut unique_tasks: HashMap<&str, Option<&Task>> = HashMap::new();
    for (_, task) in original.tasks() {
        unique_tasks.entry(task.temp_id.as_str()).and_modify(|slot| *slot = None).or_insert(Some(task));
    }

    let epics = reviewed
        .epics
        .into_iter()
        .map(|mut reviewed_epic| {
            let reviewed_tasks = std::mem::take(&mut reviewed_epic.tasks);
            let matched = original_epics.take(&reviewed_epic.temp_id);
            let mut epic = match matched {
                Some(found) => {
                    let mut epic = found.clone();
                    overlay(&mut epic.title, &mut epic.depends_on, reviewed_epic.title, reviewed_epic.depends_on);
                    epic
                }
                None => reviewed_epic,
            };
            if !reviewed_tasks.is_empty() {
                let mut sibling_tasks = ByOccurrence::new(
                    matched.into_iter().flat_map(|found| found.tasks.iter()).map(|task| (task.temp_id.as_str(), task)),
                );
                epic.tasks = reviewed_tasks
                    .into_iter()
                    .map(|reviewed_task| {
                        let found = sibling_tasks
                            .take(&reviewed_task.temp_id)
                            .or_else(|| unique_tasks.get(reviewed_task.temp_id.as_str()).copied().flatten());
                        match found {
                            Some(found) => {
                                let mut task = found.clone();
                                overlay(&mut task.title, &mut task.depends_on, reviewed_task.title, reviewed_task.depends_on);
                                task
                            }
                            None => reviewed_task,
                        }
                    })
                    .collect();
            }
            epic
        })
        .collect();

    let mut project = original.project.clone();
    if let Some(reviewed_project) = reviewed.project {
        if !reviewed_project.product_name.trim().is_empty() {
            project.product_name = reviewed_project.product_name;
        }
        if !reviewed_project.tech_stack.is_empty() {
            project.tech_stack = reviewed_project.tech_stack;
        }
    }

    let merged = ParseResponse::new(project, epics);
    match merged.validate() {
        Ok(()) => ReviewOutcome { tree: merged, was_modified, notes },
        Err(err) => {
            warn!(error = %err, "review merge failed validation, keeping original structure");
            ReviewOutcome {
                tree: original.clone(),
                was_modified: false,
                notes: format!("Review merge failed validation: {err}. Using original structure."),
            }
        }
    }
}

/// Original items by id. A repeated id hands out its items in tree order.
struct ByOccurrence<'t, T> {
    queues: HashMap<&'t str, VecDeque<&'t T>>,
}

impl<'t, T> ByOccurrence<'t, T> {
    fn new(items: impl IntoIterator<Item = (&'t str, &'t T)>) -> Self {
        let mut queues: HashMap<&'t str, VecDeque<&'t T>> = HashMap::new();
        for (id, item) in items {
            queues.entry(id).or_default().push_back(item);
        }
        Self { queues }
    }

    fn take(&mut self, id: &str) -> Option<&'t T> {
        self.queues.get_mut(id)?.pop_front()
    }
}

fn overlay(title: &mut String, depends_on: &mut Vec<String>, reviewed_title: String, reviewed_depends_on: Vec<String>) {
    if !reviewed_title.trim().is_empty() {
        *title = reviewed_title;
    }
    *depends_on = reviewed_depends_on;
}
