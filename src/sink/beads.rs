//! Creates the hierarchy in the Beads issue tracker through the `bd` CLI.
//!
//! Items are created level by level (epics, tasks, subtasks) with readable
//! ids derived from temp ids, then parents are linked and dependency edges
//! added once every id is known. A failed item never aborts the run; its
//! descendants are reported as failed too.

use std::collections::HashMap;
use std::error::Error;
use std::fmt::Write as _;

use tracing::{debug, info, warn};

use crate::hierarchy::{ContextPayload, Epic, ParseResponse, Subtask, Task, TestingRequirements};
use crate::ports::sink::CreateResult;
use crate::ports::{CreatedItem, DependencyEdge, EdgeKind, FailedItem, ItemKind, ShellExecutor, Sink};

const BD: &str = "bd";

/// Prefix used when none is configured.
pub const DEFAULT_PREFIX: &str = "prd";

const EPIC_PRIORITY: u8 = 1;
const SUBTASK_PRIORITY: u8 = 2;
const MINUTES_PER_DAY: f64 = 8.0 * 60.0;

/// `bd`-backed sink.
pub struct BeadsSink<'a> {
    shell: &'a dyn ShellExecutor,
    prefix: String,
    dry_run: bool,
}

/// One `bd create` invocation.
struct NewIssue<'i> {
    title: &'i str,
    description: String,
    kind: &'static str,
    priority: u8,
    id: String,
    acceptance: Option<String>,
    design: Option<&'i str>,
    estimate_minutes: Option<u32>,
    labels: &'i [String],
}

impl NewIssue<'_> {
    fn args(&self) -> Vec<String> {
        let mut args = vec![
            "create".to_string(),
            self.title.to_string(),
            "--description".to_string(),
            self.description.clone(),
            "--priority".to_string(),
            self.priority.to_string(),
            "--type".to_string(),
            self.kind.to_string(),
            "--id".to_string(),
            self.id.clone(),
        ];
        if let Some(acceptance) = &self.acceptance {
            args.extend(["--acceptance".to_string(), acceptance.clone()]);
        }
        if let Some(design) = self.design {
            args.extend(["--design".to_string(), design.to_string()]);
        }
        if let Some(minutes) = self.estimate_minutes.filter(|m| *m > 0) {
            args.extend(["--estimate".to_string(), minutes.to_string()]);
        }
        if !self.labels.is_empty() {
            args.extend(["--labels".to_string(), self.labels.join(",")]);
        }
        args
    }
}

impl<'a> BeadsSink<'a> {
    /// Creates a sink. An empty `prefix` falls back to [`DEFAULT_PREFIX`].
    #[must_use]
    pub fn new(shell: &'a dyn ShellExecutor, prefix: impl Into<String>, dry_run: bool) -> Self {
        let prefix = prefix.into();
        let prefix = if prefix.trim().is_empty() { DEFAULT_PREFIX.to_string() } else { prefix };
        Self { shell, prefix, dry_run }
    }

    /// Readable issue id: `1.2.3` becomes `<prefix>-e1t2s3`.
    #[must_use]
    pub fn readable_id(&self, temp_id: &str) -> String {
        let mut suffix = String::new();
        for (depth, part) in temp_id.split('.').enumerate() {
            let marker = match depth {
                0 => 'e',
                1 => 't',
                _ => 's',
            };
            suffix.push(marker);
            suffix.push_str(part);
        }
        format!("{}-{suffix}", self.prefix)
    }

    fn bd(&self, args: Vec<String>) -> Result<(), String> {
        if self.dry_run {
            println!("[dry-run] {BD} {}", args.join(" "));
            return Ok(());
        }
        let output = self.shell.run(BD, &args).map_err(|e| format!("{BD} could not be started: {e}"))?;
        if output.success() {
            Ok(())
        } else {
            let detail = if output.stderr.trim().is_empty() { output.stdout } else { output.stderr };
            Err(format!("{BD} {} failed: {}", args.first().map_or("", String::as_str), detail.trim()))
        }
    }

    fn create(&self, issue: &NewIssue<'_>) -> Result<String, String> {
        self.bd(issue.args())?;
        Ok(issue.id.clone())
    }

    fn link_parent(&self, child: &str, parent: &str, result: &mut CreateResult) {
        let args = vec!["update".to_string(), child.to_string(), "--parent".to_string(), parent.to_string()];
        match self.bd(args) {
            Ok(()) => result.dependencies.push(DependencyEdge {
                from: child.to_string(),
                to: parent.to_string(),
                kind: EdgeKind::ParentChild,
            }),
            Err(err) => warn!(child, parent, error = %err, "could not link parent"),
        }
    }

    fn add_dependencies(
        &self,
        dependent: &str,
        depends_on: &[String],
        external: &HashMap<String, String>,
        result: &mut CreateResult,
    ) {
        for blocker_temp_id in depends_on {
            let Some(blocker) = external.get(blocker_temp_id) else {
                debug!(dependent, blocker = %blocker_temp_id, "dependency target was not created, skipping");
                continue;
            };
            let args = vec!["dep".to_string(), "add".to_string(), dependent.to_string(), blocker.clone()];
            match self.bd(args) {
                Ok(()) => result.dependencies.push(DependencyEdge {
                    from: dependent.to_string(),
                    to: blocker.clone(),
                    kind: EdgeKind::Blocks,
                }),
                Err(err) => warn!(dependent, blocker = %blocker, error = %err, "could not add dependency"),
            }
        }
    }

    fn epic_issue<'e>(&self, epic: &'e Epic) -> NewIssue<'e> {
        let acceptance = (!epic.acceptance_criteria.is_empty()).then(|| {
            epic.acceptance_criteria.iter().map(|c| format!("- {c}")).collect::<Vec<_>>().join("\n")
        });
        NewIssue {
            title: &epic.title,
            description: describe(&epic.description, epic.context.as_ref().map(context_block).as_deref(), &epic.testing),
            kind: "epic",
            priority: EPIC_PRIORITY,
            id: self.readable_id(&epic.temp_id),
            acceptance,
            design: None,
            estimate_minutes: epic.estimated_days.map(|days| to_minutes(days * MINUTES_PER_DAY)),
            labels: &epic.labels,
        }
    }

    fn task_issue<'t>(&self, task: &'t Task) -> NewIssue<'t> {
        NewIssue {
            title: &task.title,
            description: describe(&task.description, task.context.as_ref().map(context_block).as_deref(), &task.testing),
            kind: "task",
            priority: task.priority.unwrap_or_default().rank(),
            id: self.readable_id(&task.temp_id),
            acceptance: None,
            design: task.design_notes.as_deref(),
            estimate_minutes: task.estimated_hours.map(|hours| to_minutes(hours * 60.0)),
            labels: &task.labels,
        }
    }

    fn subtask_issue<'s>(&self, subtask: &'s Subtask) -> NewIssue<'s> {
        let context = subtask.context.as_deref().map(|text| format!("**Context:** {text}"));
        NewIssue {
            title: &subtask.title,
            description: describe(&subtask.description, context.as_deref(), &subtask.testing),
            kind: "task",
            priority: SUBTASK_PRIORITY,
            id: self.readable_id(&subtask.temp_id),
            acceptance: None,
            design: None,
            estimate_minutes: subtask.estimated_minutes,
            labels: &subtask.labels,
        }
    }
}

impl Sink for BeadsSink<'_> {
    fn name(&self) -> &'static str {
        "beads"
    }

    fn is_available(&self) -> bool {
        if self.dry_run {
            return true;
        }
        self.shell.run(BD, &["--version".to_string()]).is_ok_and(|output| output.success())
    }

    fn create_items(&self, tree: &ParseResponse) -> Result<CreateResult, Box<dyn Error + Send + Sync>> {
        let mut result = CreateResult::default();
        let mut external: HashMap<String, String> = HashMap::new();

        for epic in &tree.epics {
            match self.create(&self.epic_issue(epic)) {
                Ok(id) => {
                    record(&mut result, &mut external, id, &epic.temp_id, ItemKind::Epic, &epic.title, None);
                }
                Err(reason) => fail(&mut result, &epic.temp_id, ItemKind::Epic, &epic.title, reason),
            }
        }
        if result.created.is_empty() && !tree.epics.is_empty() {
            let reason = result.failed.first().map_or_else(String::new, |f| f.reason.clone());
            return Err(format!("no epic could be created: {reason}").into());
        }

        for epic in &tree.epics {
            let parent = external.get(&epic.temp_id).cloned();
            for task in &epic.tasks {
                let Some(parent) = &parent else {
                    fail(&mut result, &task.temp_id, ItemKind::Task, &task.title, parent_missing(&epic.temp_id));
                    continue;
                };
                match self.create(&self.task_issue(task)) {
                    Ok(id) => {
                        self.link_parent(&id, parent, &mut result);
                        record(&mut result, &mut external, id, &task.temp_id, ItemKind::Task, &task.title, Some(parent));
                    }
                    Err(reason) => fail(&mut result, &task.temp_id, ItemKind::Task, &task.title, reason),
                }
            }
        }

        for task in tree.tasks().map(|(_, task)| task) {
            let parent = external.get(&task.temp_id).cloned();
            for subtask in &task.subtasks {
                let Some(parent) = &parent else {
                    fail(&mut result, &subtask.temp_id, ItemKind::Subtask, &subtask.title, parent_missing(&task.temp_id));
                    continue;
                };
                match self.create(&self.subtask_issue(subtask)) {
                    Ok(id) => {
                        self.link_parent(&id, parent, &mut result);
                        record(
                            &mut result,
                            &mut external,
                            id,
                            &subtask.temp_id,
                            ItemKind::Subtask,
                            &subtask.title,
                            Some(parent),
                        );
                    }
                    Err(reason) => fail(&mut result, &subtask.temp_id, ItemKind::Subtask, &subtask.title, reason),
                }
            }
        }

        for epic in &tree.epics {
            if let Some(id) = external.get(&epic.temp_id) {
                self.add_dependencies(id, &epic.depends_on, &external, &mut result);
            }
            for task in &epic.tasks {
                if let Some(id) = external.get(&task.temp_id) {
                    self.add_dependencies(id, &task.depends_on, &external, &mut result);
                }
                for subtask in &task.subtasks {
                    if let Some(id) = external.get(&subtask.temp_id) {
                        self.add_dependencies(id, &subtask.depends_on, &external, &mut result);
                    }
                }
            }
        }

        result.tally();
        info!(
            created = result.created.len(),
            failed = result.failed.len(),
            dependencies = result.stats.dependencies,
            dry_run = self.dry_run,
            "beads items created"
        );
        Ok(result)
    }
}

fn record(
    result: &mut CreateResult,
    external: &mut HashMap<String, String>,
    id: String,
    temp_id: &str,
    kind: ItemKind,
    title: &str,
    parent: Option<&String>,
) {
    external.insert(temp_id.to_string(), id.clone());
    result.created.push(CreatedItem {
        external_id: id,
        temp_id: temp_id.to_string(),
        kind,
        title: title.to_string(),
        parent_external_id: parent.cloned(),
    });
}

fn fail(result: &mut CreateResult, temp_id: &str, kind: ItemKind, title: &str, reason: String) {
    warn!(%kind, temp_id, error = %reason, "item not created");
    result.failed.push(FailedItem { temp_id: temp_id.to_string(), kind, title: title.to_string(), reason });
}

fn parent_missing(parent_temp_id: &str) -> String {
    format!("parent {parent_temp_id} was not created")
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn to_minutes(value: f64) -> u32 {
    value.max(0.0).round().min(f64::from(u32::MAX)) as u32
}

/// Renders a context payload as a markdown block.
fn context_block(context: &ContextPayload) -> String {
    match context {
        ContextPayload::Text(text) => format!("**Context:** {text}"),
        ContextPayload::Fields(fields) => {
            let mut block = String::from("**Context:**");
            for (key, value) in fields {
                let text = value.as_str().map_or_else(|| value.to_string(), str::to_string);
                if text.is_empty() {
                    continue;
                }
                let _ = write!(block, "\n- **{}:** {text}", title_case(key));
            }
            block
        }
    }
}

fn title_case(key: &str) -> String {
    key.split('_')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            chars.next().map_or_else(String::new, |first| first.to_uppercase().chain(chars).collect())
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Description followed by optional context and testing blocks.
fn describe(base: &str, context: Option<&str>, testing: &TestingRequirements) -> String {
    let mut description = base.to_string();
    if let Some(context) = context.filter(|c| !c.is_empty()) {
        let _ = write!(description, "\n\n{context}");
    }
    let entries = testing.entries();
    if !entries.is_empty() {
        description.push_str("\n\n**Testing Requirements:**");
        for (label, text) in entries {
            let _ = write!(description, "\n- **{label} Tests:** {text}");
        }
    }
    description
}
