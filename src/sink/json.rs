//! Writes the hierarchy as pretty JSON to a file or stdout.

use std::error::Error;
use std::path::PathBuf;

use tracing::info;

use crate::hierarchy::ParseResponse;
use crate::ports::sink::CreateResult;
use crate::ports::{CreatedItem, DependencyEdge, EdgeKind, FileSystem, ItemKind, Sink};

/// File or stdout JSON sink. Always available.
pub struct JsonSink<'a> {
    fs: &'a dyn FileSystem,
    path: Option<PathBuf>,
    dry_run: bool,
}

impl<'a> JsonSink<'a> {
    /// Writes to `path`, or stdout when `None`.
    #[must_use]
    pub fn new(fs: &'a dyn FileSystem, path: Option<PathBuf>, dry_run: bool) -> Self {
        Self { fs, path, dry_run }
    }
}

fn external_id(kind: ItemKind, temp_id: &str) -> String {
    format!("{kind}-{temp_id}")
}

impl Sink for JsonSink<'_> {
    fn name(&self) -> &'static str {
        "json"
    }

    fn is_available(&self) -> bool {
        true
    }

    fn create_items(&self, tree: &ParseResponse) -> Result<CreateResult, Box<dyn Error + Send + Sync>> {
        let rendered = serde_json::to_string_pretty(tree)?;
        match (&self.path, self.dry_run) {
            (_, true) => {
                println!("[dry-run] Would write:");
                println!("{rendered}");
            }
            (Some(path), false) => {
                self.fs.write(path, &rendered)?;
                info!(path = %path.display(), "hierarchy written");
            }
            (None, false) => println!("{rendered}"),
        }

        let mut result = CreateResult::default();
        let mut item = |kind, temp_id: &str, title: &str, parent: Option<String>| {
            result.created.push(CreatedItem {
                external_id: external_id(kind, temp_id),
                temp_id: temp_id.to_string(),
                kind,
                title: title.to_string(),
                parent_external_id: parent,
            });
        };
        for epic in &tree.epics {
            item(ItemKind::Epic, &epic.temp_id, &epic.title, None);
            for task in &epic.tasks {
                item(ItemKind::Task, &task.temp_id, &task.title, Some(external_id(ItemKind::Epic, &epic.temp_id)));
                for subtask in &task.subtasks {
                    item(
                        ItemKind::Subtask,
                        &subtask.temp_id,
                        &subtask.title,
                        Some(external_id(ItemKind::Task, &task.temp_id)),
                    );
                }
            }
        }

        let blocks = |kind, temp_id: &str, depends_on: &[String]| {
            depends_on
                .iter()
                .map(|blocker| DependencyEdge {
                    from: external_id(kind, temp_id),
                    to: external_id(kind, blocker),
                    kind: EdgeKind::Blocks,
                })
                .collect::<Vec<_>>()
        };
        for epic in &tree.epics {
            result.dependencies.extend(blocks(ItemKind::Epic, &epic.temp_id, &epic.depends_on));
            for task in &epic.tasks {
                result.dependencies.push(DependencyEdge {
                    from: external_id(ItemKind::Task, &task.temp_id),
                    to: external_id(ItemKind::Epic, &epic.temp_id),
                    kind: EdgeKind::ParentChild,
                });
                result.dependencies.extend(blocks(ItemKind::Task, &task.temp_id, &task.depends_on));
                for subtask in &task.subtasks {
                    result.dependencies.push(DependencyEdge {
                        from: external_id(ItemKind::Subtask, &subtask.temp_id),
                        to: external_id(ItemKind::Task, &task.temp_id),
                        kind: EdgeKind::ParentChild,
                    });
                    result.dependencies.extend(blocks(ItemKind::Subtask, &subtask.temp_id, &subtask.depends_on));
                }
            }
        }

        result.tally();
        Ok(result)
    }
}
