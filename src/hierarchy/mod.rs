//! Work-breakdown hierarchy: project context, epics, tasks and subtasks.
//!
//! Temp ids are dot-delimited (`"1"`, `"1.2"`, `"1.2.3"`). They are the join
//! key used to re-attach children produced in parallel and to express
//! dependency edges.

pub(crate) mod lenient;
pub mod validate;

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use validate::{validate, StructuralError};

/// Five ordered priority levels. `Critical` compares greatest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Priority {
    /// Nice to have.
    VeryLow,
    /// Can slip.
    Low,
    /// Normal work.
    #[default]
    Medium,
    /// Important, schedule early.
    High,
    /// Blocks everything else.
    Critical,
}

impl Priority {
    /// Numeric rank used by issue trackers: critical is 0, very-low is 4.
    #[must_use]
    pub fn rank(self) -> u8 {
        match self {
            Self::Critical => 0,
            Self::High => 1,
            Self::Medium => 2,
            Self::Low => 3,
            Self::VeryLow => 4,
        }
    }

    /// Canonical lowercase name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
            Self::VeryLow => "very-low",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace(['_', ' '], "-").as_str() {
            "critical" | "p0" => Ok(Self::Critical),
            "high" | "p1" => Ok(Self::High),
            "medium" | "normal" | "p2" => Ok(Self::Medium),
            "low" | "p3" => Ok(Self::Low),
            "very-low" | "verylow" | "lowest" | "p4" => Ok(Self::VeryLow),
            other => Err(format!("unknown priority '{other}'")),
        }
    }
}

impl<'de> Deserialize<'de> for Priority {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Business or user framing attached to an epic or task.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ContextPayload {
    /// Plain prose.
    Text(String),
    /// Structured fields such as `business_context` or `target_users`.
    Fields(serde_json::Map<String, serde_json::Value>),
}

impl ContextPayload {
    /// Flattens the payload to one line of prose for prompt framing.
    #[must_use]
    pub fn summary(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Fields(fields) => fields
                .iter()
                .map(|(key, value)| match value {
                    serde_json::Value::String(s) => format!("{}: {s}", key.replace('_', " ")),
                    other => format!("{}: {other}", key.replace('_', " ")),
                })
                .collect::<Vec<_>>()
                .join("; "),
        }
    }
}

/// Free-text testing expectations per dimension. Absent means not applicable.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TestingRequirements {
    /// Unit test expectations.
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient::optional_text")]
    pub unit_tests: Option<String>,
    /// Integration test expectations.
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient::optional_text")]
    pub integration_tests: Option<String>,
    /// Type or schema checks.
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient::optional_text")]
    pub type_tests: Option<String>,
    /// End-to-end test expectations.
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient::optional_text")]
    pub e2e_tests: Option<String>,
}

impl TestingRequirements {
    /// Returns `true` when no dimension is filled in.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.unit_tests.is_none()
            && self.integration_tests.is_none()
            && self.type_tests.is_none()
            && self.e2e_tests.is_none()
    }

    /// Filled dimensions as `(label, text)` pairs, in display order.
    #[must_use]
    pub fn entries(&self) -> Vec<(&'static str, &str)> {
        [
            ("Unit", &self.unit_tests),
            ("Integration", &self.integration_tests),
            ("Type", &self.type_tests),
            ("E2E", &self.e2e_tests),
        ]
        .into_iter()
        .filter_map(|(label, slot)| slot.as_deref().map(|text| (label, text)))
        .collect()
    }
}

/// Atomic leaf of the hierarchy.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Subtask {
    /// Hierarchical temp id, e.g. `"1.2.3"`.
    #[serde(default, deserialize_with = "lenient::id")]
    pub temp_id: String,
    /// Short imperative title.
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub title: String,
    /// Implementation detail.
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub description: String,
    /// Reminder of the inherited context.
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient::optional_text")]
    pub context: Option<String>,
    /// Testing expectations.
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub testing: TestingRequirements,
    /// Estimated effort in minutes.
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient::minutes")]
    pub estimated_minutes: Option<u32>,
    /// Temp ids of sibling subtasks this one waits on.
    #[serde(default, deserialize_with = "lenient::string_list")]
    pub depends_on: Vec<String>,
    /// Categorization labels.
    #[serde(default, deserialize_with = "lenient::string_list")]
    pub labels: Vec<String>,
}

/// A unit of work under an epic.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Task {
    /// Hierarchical temp id, e.g. `"1.2"`.
    #[serde(default, deserialize_with = "lenient::id")]
    pub temp_id: String,
    /// Task title.
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub title: String,
    /// What needs to be done.
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub description: String,
    /// Why the task matters.
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient::context")]
    pub context: Option<ContextPayload>,
    /// Technical approach.
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient::optional_text")]
    pub design_notes: Option<String>,
    /// Testing expectations.
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub testing: TestingRequirements,
    /// Priority; unset values take the configured default after generation.
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient::priority")]
    pub priority: Option<Priority>,
    /// Child subtasks.
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub subtasks: Vec<Subtask>,
    /// Temp ids of tasks this one waits on.
    #[serde(default, deserialize_with = "lenient::string_list")]
    pub depends_on: Vec<String>,
    /// Estimated effort in hours.
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient::estimate")]
    pub estimated_hours: Option<f64>,
    /// Categorization labels.
    #[serde(default, deserialize_with = "lenient::string_list")]
    pub labels: Vec<String>,
}

/// A major milestone.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Epic {
    /// Hierarchical temp id, e.g. `"1"`.
    #[serde(default, deserialize_with = "lenient::id")]
    pub temp_id: String,
    /// Epic title.
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub title: String,
    /// What the epic delivers.
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub description: String,
    /// Business and user framing.
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient::context")]
    pub context: Option<ContextPayload>,
    /// Verifiable completion conditions.
    #[serde(default, deserialize_with = "lenient::string_list")]
    pub acceptance_criteria: Vec<String>,
    /// Testing expectations.
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub testing: TestingRequirements,
    /// Child tasks.
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub tasks: Vec<Task>,
    /// Temp ids of epics this one waits on.
    #[serde(default, deserialize_with = "lenient::string_list")]
    pub depends_on: Vec<String>,
    /// Estimated effort in working days.
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient::estimate")]
    pub estimated_days: Option<f64>,
    /// Categorization labels.
    #[serde(default, deserialize_with = "lenient::string_list")]
    pub labels: Vec<String>,
}

/// Summary of the source document.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ProjectContext {
    /// Product name; required.
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub product_name: String,
    /// One-line pitch.
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub elevator_pitch: String,
    /// Who the product is for.
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub target_audience: String,
    /// Business goals, in document order.
    #[serde(default, deserialize_with = "lenient::string_list")]
    pub business_goals: Vec<String>,
    /// User goals, in document order.
    #[serde(default, deserialize_with = "lenient::string_list")]
    pub user_goals: Vec<String>,
    /// Technologies named by the document.
    #[serde(default, deserialize_with = "lenient::string_list")]
    pub tech_stack: Vec<String>,
    /// Constraints and non-negotiables.
    #[serde(default, deserialize_with = "lenient::string_list")]
    pub constraints: Vec<String>,
    /// Optional brand voice or styling guidance.
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient::context")]
    pub brand_guidelines: Option<ContextPayload>,
}

/// Which testing dimensions appear anywhere in the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TestingCoverage {
    /// Some item specifies unit tests.
    pub has_unit_tests: bool,
    /// Some item specifies integration tests.
    pub has_integration_tests: bool,
    /// Some item specifies type or schema checks.
    pub has_type_tests: bool,
    /// Some item specifies end-to-end tests.
    pub has_e2e_tests: bool,
}

impl TestingCoverage {
    fn absorb(&mut self, testing: &TestingRequirements) {
        self.has_unit_tests |= testing.unit_tests.is_some();
        self.has_integration_tests |= testing.integration_tests.is_some();
        self.has_type_tests |= testing.type_tests.is_some();
        self.has_e2e_tests |= testing.e2e_tests.is_some();
    }
}

/// Counts derived from the tree. Always recomputed, never trusted from input.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ResponseMetadata {
    /// Number of epics.
    pub total_epics: usize,
    /// Number of tasks across all epics.
    pub total_tasks: usize,
    /// Number of subtasks across all tasks.
    pub total_subtasks: usize,
    /// Sum of epic estimates, when any epic carries one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_total_days: Option<f64>,
    /// Testing dimensions present in the tree.
    pub testing_coverage: TestingCoverage,
}

/// Root aggregate handed between stages and to sinks.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ParseResponse {
    /// Project summary.
    #[serde(default)]
    pub project: ProjectContext,
    /// Epics in plan order.
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub epics: Vec<Epic>,
    /// Derived counts.
    #[serde(default)]
    pub metadata: ResponseMetadata,
}

impl ParseResponse {
    /// Builds a tree and computes its metadata.
    #[must_use]
    pub fn new(project: ProjectContext, epics: Vec<Epic>) -> Self {
        let mut tree = Self { project, epics, metadata: ResponseMetadata::default() };
        tree.refresh_metadata();
        tree
    }

    /// Computes metadata from the current tree contents.
    #[must_use]
    pub fn compute_metadata(&self) -> ResponseMetadata {
        let mut metadata = ResponseMetadata { total_epics: self.epics.len(), ..Default::default() };
        let mut days = None;
        for epic in &self.epics {
            metadata.testing_coverage.absorb(&epic.testing);
            if let Some(estimate) = epic.estimated_days {
                days = Some(days.unwrap_or(0.0) + estimate);
            }
            metadata.total_tasks += epic.tasks.len();
            for task in &epic.tasks {
                metadata.testing_coverage.absorb(&task.testing);
                metadata.total_subtasks += task.subtasks.len();
                for subtask in &task.subtasks {
                    metadata.testing_coverage.absorb(&subtask.testing);
                }
            }
        }
        metadata.estimated_total_days = days;
        metadata
    }

    /// Replaces `metadata` with freshly computed counts.
    pub fn refresh_metadata(&mut self) {
        self.metadata = self.compute_metadata();
    }

    /// Checks the structural invariants.
    ///
    /// # Errors
    ///
    /// Returns the first [`StructuralError`] found.
    pub fn validate(&self) -> Result<(), StructuralError> {
        validate(self)
    }

    /// Gives every task without a priority the supplied default.
    pub fn fill_default_priority(&mut self, default: Priority) {
        for task in self.epics.iter_mut().flat_map(|epic| epic.tasks.iter_mut()) {
            task.priority.get_or_insert(default);
        }
    }

    /// Rewrites every temp id from its position in the tree so ids are
    /// unique per level and each child carries its parent's prefix.
    /// Dependency edges follow the rename.
    pub fn renumber(&mut self) {
        renumber_children("", self.epics.iter_mut().map(|epic| (&mut epic.temp_id, &mut epic.depends_on)));
        renumber_level(
            self.epics
                .iter_mut()
                .map(|epic| {
                    let Epic { temp_id, tasks, .. } = epic;
                    (temp_id.clone(), tasks.iter_mut().map(|task| (&mut task.temp_id, &mut task.depends_on)).collect::<Vec<_>>())
                })
                .collect(),
        );
        renumber_level(
            self.epics
                .iter_mut()
                .flat_map(|epic| epic.tasks.iter_mut())
                .map(|task| {
                    let Task { temp_id, subtasks, .. } = task;
                    (
                        temp_id.clone(),
                        subtasks.iter_mut().map(|subtask| (&mut subtask.temp_id, &mut subtask.depends_on)).collect::<Vec<_>>(),
                    )
                })
                .collect(),
        );
    }

    /// Iterates all tasks with their owning epic.
    pub fn tasks(&self) -> impl Iterator<Item = (&Epic, &Task)> {
        self.epics.iter().flat_map(|epic| epic.tasks.iter().map(move |task| (epic, task)))
    }
}

/// A child's id slot and its sibling dependency edges.
pub(crate) type IdSlot<'a> = (&'a mut String, &'a mut Vec<String>);

/// Renumbers one sibling group by position.
pub(crate) fn renumber_children<'a, I>(parent_id: &str, children: I)
where
    I: IntoIterator<Item = IdSlot<'a>>,
{
    renumber_level(vec![(parent_id.to_string(), children.into_iter().collect())]);
}

/// Renumbers every sibling group of one level: the n-th child of `parent`
/// becomes `<parent>.<n>` (just `<n>` under an empty parent).
///
/// Edges naming an old id are rewritten to its new id. A sibling match wins
/// over a match elsewhere in the level; an old id that repeats is resolved
/// to its first occurrence among siblings and left alone across groups.
/// Edges naming no known id are kept as written.
pub(crate) fn renumber_level(mut groups: Vec<(String, Vec<IdSlot<'_>>)>) {
    let mut siblings: Vec<HashMap<String, String>> = Vec::with_capacity(groups.len());
    let mut level: HashMap<String, Option<String>> = HashMap::new();

    for (parent_id, children) in &mut groups {
        let mut renamed = HashMap::new();
        for (position, (id, _)) in children.iter_mut().enumerate() {
            let new_id = child_id(parent_id, position + 1);
            let old_id = std::mem::replace(&mut **id, new_id.clone()).trim().to_string();
            if old_id.is_empty() {
                continue;
            }
            renamed.entry(old_id.clone()).or_insert_with(|| new_id.clone());
            level.entry(old_id).and_modify(|slot| *slot = None).or_insert(Some(new_id));
        }
        siblings.push(renamed);
    }

    for ((_, children), renamed) in groups.iter_mut().zip(&siblings) {
        for (_, edges) in children.iter_mut() {
            for edge in edges.iter_mut() {
                let key = edge.trim();
                let target = renamed.get(key).or_else(|| level.get(key).and_then(Option::as_ref));
                if let Some(target) = target {
                    *edge = target.clone();
                }
            }
        }
    }
}

fn child_id(parent_id: &str, position: usize) -> String {
    if parent_id.is_empty() {
        position.to_string()
    } else {
        format!("{parent_id}.{position}")
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn subtask(id: &str, unit: Option<&str>) -> Subtask {
        Subtask {
            temp_id: id.into(),
            title: format!("Subtask {id}"),
            testing: TestingRequirements { unit_tests: unit.map(String::from), ..Default::default() },
            ..Default::default()
        }
    }

    #[test]
    fn metadata_counts_every_level() {
        let tree = ParseResponse::new(
            ProjectContext { product_name: "Todo".into(), ..Default::default() },
            vec![Epic {
                temp_id: "1".into(),
                title: "Core".into(),
                estimated_days: Some(2.5),
                tasks: vec![
                    Task {
                        temp_id: "1.1".into(),
                        subtasks: vec![subtask("1.1.1", Some("covers create")), subtask("1.1.2", None)],
                        ..Default::default()
                    },
                    Task {
                        temp_id: "1.2".into(),
                        testing: TestingRequirements {
                            e2e_tests: Some("complete a todo in the browser".into()),
                            ..Default::default()
                        },
                        subtasks: vec![subtask("1.2.1", None)],
                        ..Default::default()
                    },
                ],
                ..Default::default()
            }],
        );

        assert_eq!(tree.metadata.total_epics, 1);
        assert_eq!(tree.metadata.total_tasks, 2);
        assert_eq!(tree.metadata.total_subtasks, 3);
        assert_eq!(tree.metadata.estimated_total_days, Some(2.5));
        assert!(tree.metadata.testing_coverage.has_unit_tests);
        assert!(tree.metadata.testing_coverage.has_e2e_tests);
        assert!(!tree.metadata.testing_coverage.has_integration_tests);
    }

    #[test]
    fn decodes_loose_generated_json() {
        let tree: ParseResponse = serde_json::from_value(json!({
            "project": {"product_name": "Todo", "tech_stack": "Rust", "constraints": null},
            "epics": [{
                "temp_id": 1,
                "title": "Core",
                "context": {"business_context": "retention"},
                "tasks": [{"temp_id": "1.1", "title": "Store", "priority": "P1", "subtasks": null}]
            }]
        }))
        .expect("loose json should decode");

        assert_eq!(tree.project.tech_stack, vec!["Rust"]);
        assert!(tree.project.constraints.is_empty());
        assert_eq!(tree.epics[0].temp_id, "1");
        assert_eq!(
            tree.epics[0].context.as_ref().map(ContextPayload::summary).as_deref(),
            Some("business context: retention")
        );
        assert_eq!(tree.epics[0].tasks[0].priority, Some(Priority::High));
        assert!(tree.epics[0].tasks[0].subtasks.is_empty());
    }

    #[test]
    fn priority_orders_critical_highest() {
        assert!(Priority::Critical > Priority::High);
        assert!(Priority::Low > Priority::VeryLow);
        assert_eq!(serde_json::to_value(Priority::VeryLow).unwrap(), json!("very-low"));
        assert_eq!(Priority::Critical.rank(), 0);
    }

    #[test]
    fn default_priority_fills_only_missing() {
        let mut tree = ParseResponse::new(
            ProjectContext::default(),
            vec![Epic {
                tasks: vec![
                    Task { priority: Some(Priority::Critical), ..Default::default() },
                    Task::default(),
                ],
                ..Default::default()
            }],
        );
        tree.fill_default_priority(Priority::Low);
        assert_eq!(tree.epics[0].tasks[0].priority, Some(Priority::Critical));
        assert_eq!(tree.epics[0].tasks[1].priority, Some(Priority::Low));
    }

    #[test]
    fn children_are_numbered_by_position() {
        let mut ids = vec![String::new(), "2.9".to_string(), "7.1".to_string()];
        let mut edges = vec![vec![], vec!["7.1".to_string()], vec!["2.9".to_string(), "3.1".to_string()]];
        renumber_children("2", ids.iter_mut().zip(edges.iter_mut()));

        assert_eq!(ids, vec!["2.1", "2.2", "2.3"]);
        assert_eq!(edges[1], vec!["2.3"]);
        assert_eq!(edges[2], vec!["2.2", "3.1"]);
    }

    #[test]
    fn repeated_ids_become_unique_across_the_tree() {
        let task = |title: &str| Task {
            temp_id: "1.1".into(),
            title: title.into(),
            subtasks: vec![subtask("1.1.1", None), subtask("1.1.1", None)],
            ..Default::default()
        };
        let mut tree = ParseResponse::new(
            ProjectContext::default(),
            vec![
                Epic { temp_id: "1".into(), tasks: vec![task("a")], ..Default::default() },
                Epic { temp_id: "1".into(), tasks: vec![task("b"), task("c")], ..Default::default() },
            ],
        );
        tree.epics[1].tasks[1].depends_on = vec!["1.1".into()];
        tree.renumber();

        let ids: Vec<&str> = tree.tasks().map(|(_, task)| task.temp_id.as_str()).collect();
        assert_eq!(ids, vec!["1.1", "2.1", "2.2"]);
        assert_eq!(tree.epics[1].tasks[1].depends_on, vec!["2.1"]);
        assert_eq!(tree.epics[1].tasks[1].subtasks[1].temp_id, "2.2.2");
        for (epic, task) in tree.tasks() {
            assert!(task.temp_id.starts_with(&format!("{}.", epic.temp_id)));
        }
    }
}
