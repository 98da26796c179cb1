//! Sink port: where a validated hierarchy ends up.

use std::error::Error;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::hierarchy::ParseResponse;

/// Hierarchy level of a created item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    /// An epic.
    Epic,
    /// A task.
    Task,
    /// A subtask.
    Subtask,
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Epic => "epic",
            Self::Task => "task",
            Self::Subtask => "subtask",
        })
    }
}

/// Kind of edge between two created items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EdgeKind {
    /// `from` cannot start until `to` is done.
    Blocks,
    /// `from` is a child of `to`.
    ParentChild,
}

/// An item the sink created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedItem {
    /// Identifier assigned by the sink.
    pub external_id: String,
    /// Hierarchy temp id it came from.
    pub temp_id: String,
    /// Hierarchy level.
    pub kind: ItemKind,
    /// Title as created.
    pub title: String,
    /// External id of the parent, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_external_id: Option<String>,
}

/// An item the sink could not create.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedItem {
    /// Hierarchy temp id.
    pub temp_id: String,
    /// Hierarchy level.
    pub kind: ItemKind,
    /// Title that was attempted.
    pub title: String,
    /// Why it failed.
    pub reason: String,
}

/// A dependency or containment edge between external ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyEdge {
    /// Dependent (or child) external id.
    pub from: String,
    /// Blocker (or parent) external id.
    pub to: String,
    /// Edge kind.
    pub kind: EdgeKind,
}

/// Totals of what was created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CreateStats {
    /// Epics created.
    pub epics: usize,
    /// Tasks created.
    pub tasks: usize,
    /// Subtasks created.
    pub subtasks: usize,
    /// Edges recorded.
    pub dependencies: usize,
}

/// Outcome of handing a tree to a sink.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CreateResult {
    /// Items created, in creation order.
    pub created: Vec<CreatedItem>,
    /// Items that could not be created.
    pub failed: Vec<FailedItem>,
    /// Edges recorded.
    pub dependencies: Vec<DependencyEdge>,
    /// Totals.
    pub stats: CreateStats,
}

impl CreateResult {
    /// Recomputes `stats` from `created` and `dependencies`.
    pub fn tally(&mut self) {
        let count = |kind| self.created.iter().filter(|item| item.kind == kind).count();
        self.stats = CreateStats {
            epics: count(ItemKind::Epic),
            tasks: count(ItemKind::Task),
            subtasks: count(ItemKind::Subtask),
            dependencies: self.dependencies.len(),
        };
    }
}

/// Accepts a validated hierarchy.
pub trait Sink: Send + Sync {
    /// Short name for messages, e.g. `"beads"`.
    fn name(&self) -> &'static str;

    /// Returns `true` when the sink can currently accept items.
    fn is_available(&self) -> bool;

    /// Creates items for every epic, task and subtask in `tree`.
    ///
    /// Per-item failures are reported in [`CreateResult::failed`].
    ///
    /// # Errors
    ///
    /// Returns an error when the sink cannot proceed at all.
    fn create_items(
        &self,
        tree: &ParseResponse,
    ) -> Result<CreateResult, Box<dyn Error + Send + Sync>>;
}
