//! Three-stage generation: epics, then tasks per epic, then subtasks per
//! task. Stages run strictly in sequence; stages 2 and 3 fan out.

use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::epic_review::EpicReview;
use super::{call, fanout, prompts, Stage};
use crate::config::ParseConfig;
use crate::error::Result;
use crate::hierarchy::{renumber_children, Epic, ParseResponse, ProjectContext, StructuralError, Subtask, Task};
use crate::ports::{GenerationCapability, GenerationRequest, Purpose};

/// Concurrent stage 2 calls.
pub const TASK_CONCURRENCY: usize = 3;

/// Concurrent stage 3 calls.
pub const SUBTASK_CONCURRENCY: usize = 5;

/// Stage 3 attempts per task: one call plus two retries.
pub const SUBTASK_ATTEMPTS: usize = 3;

#[derive(Deserialize)]
struct EpicOutline {
    #[serde(default)]
    project: ProjectContext,
    #[serde(default, deserialize_with = "crate::hierarchy::lenient::or_default")]
    epics: Vec<Epic>,
}

#[derive(Deserialize)]
struct TaskBatch {
    #[serde(default, deserialize_with = "crate::hierarchy::lenient::or_default")]
    tasks: Vec<Task>,
}

#[derive(Deserialize)]
struct SubtaskBatch {
    #[serde(default, deserialize_with = "crate::hierarchy::lenient::or_default")]
    subtasks: Vec<Subtask>,
}

/// One stage 3 work item.
struct TaskRef<'t> {
    epic_index: usize,
    task_index: usize,
    task: &'t Task,
    epic_context: String,
}

/// Orchestrates the three generation stages.
pub struct MultiStageGenerator<'a> {
    capability: &'a dyn GenerationCapability,
    config: &'a ParseConfig,
    cancel: CancellationToken,
    epic_review: Option<&'a dyn EpicReview>,
}

impl<'a> MultiStageGenerator<'a> {
    /// Creates a generator over `capability`.
    #[must_use]
    pub fn new(capability: &'a dyn GenerationCapability, config: &'a ParseConfig, cancel: CancellationToken) -> Self {
        Self { capability, config, cancel, epic_review: None }
    }

    /// Installs a hook that runs between stage 1 and stage 2.
    #[must_use]
    pub fn with_epic_review(mut self, hook: &'a dyn EpicReview) -> Self {
        self.epic_review = Some(hook);
        self
    }

    /// Runs all three stages and returns a validated tree. Any failure in a
    /// stage aborts the run before the next stage starts.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::Error::Stage`] naming the stage and unit that
    /// failed, or [`crate::error::Error::Cancelled`].
    pub async fn generate(&self, document: &str) -> Result<ParseResponse> {
        let (project, epics) =
            self.generate_epics(document).await.map_err(|e| e.in_stage(Stage::Epics, "document"))?;

        let epics = match self.epic_review {
            Some(hook) => hook.review(&project, epics)?,
            None => epics,
        };
        if epics.is_empty() {
            return Err(StructuralError::new("epics", "at least one epic required").into());
        }

        let epics = self.generate_tasks(document, &project, epics).await?;
        let epics = self.generate_subtasks(document, &project, epics).await?;

        let mut tree = ParseResponse::new(project, epics);
        tree.fill_default_priority(self.config.default_priority);
        tree.validate()?;

        info!(
            epics = tree.metadata.total_epics,
            tasks = tree.metadata.total_tasks,
            subtasks = tree.metadata.total_subtasks,
            "multi-stage hierarchy generated"
        );
        Ok(tree)
    }

    async fn generate_epics(&self, document: &str) -> Result<(ProjectContext, Vec<Epic>)> {
        info!(stage = %Stage::Epics, "generating epics");
        let request = self.request(
            Purpose::Epics,
            None,
            prompts::EPICS_SYSTEM,
            prompts::epics_prompt(document, self.config),
        );
        let outline: EpicOutline = call::generate_json(self.capability, &request, &self.cancel).await?;

        let mut epics = outline.epics;
        if epics.is_empty() {
            return Err(StructuralError::new("epics", "no epics generated").into());
        }
        renumber_children("", epics.iter_mut().map(|epic| (&mut epic.temp_id, &mut epic.depends_on)));
        for epic in &mut epics {
            epic.tasks.clear();
        }

        info!(stage = %Stage::Epics, epics = epics.len(), "stage complete");
        Ok((outline.project, epics))
    }

    async fn generate_tasks(&self, document: &str, project: &ProjectContext, mut epics: Vec<Epic>) -> Result<Vec<Epic>> {
        info!(stage = %Stage::Tasks, epics = epics.len(), limit = TASK_CONCURRENCY, "generating tasks");

        let slots = fanout::run_bounded(&epics, TASK_CONCURRENCY, &self.cancel, |index, epic| async move {
            self.tasks_for(index, epic, project, document)
                .await
                .map_err(|e| e.in_stage(Stage::Tasks, format!("epic {}", epic.temp_id)))
        })
        .await;
        let task_lists = fanout::collect_slots(slots, &self.cancel)?;

        for (epic, tasks) in epics.iter_mut().zip(task_lists) {
            epic.tasks = tasks;
        }
        info!(stage = %Stage::Tasks, tasks = epics.iter().map(|e| e.tasks.len()).sum::<usize>(), "stage complete");
        Ok(epics)
    }

    async fn tasks_for(&self, index: usize, epic: &Epic, project: &ProjectContext, document: &str) -> Result<Vec<Task>> {
        let request = self.request(
            Purpose::Tasks,
            Some(&epic.temp_id),
            prompts::TASKS_SYSTEM,
            prompts::tasks_prompt(epic, project, self.config, self.full_document(document)),
        );
        let batch: TaskBatch = call::generate_json(self.capability, &request, &self.cancel).await?;

        let mut tasks = batch.tasks;
        if tasks.is_empty() {
            return Err(StructuralError::new(
                format!("epics[{index}].tasks"),
                format!("epic '{}' has empty tasks array", epic.title),
            )
            .into());
        }
        renumber_children(&epic.temp_id, tasks.iter_mut().map(|task| (&mut task.temp_id, &mut task.depends_on)));
        for task in &mut tasks {
            task.subtasks.clear();
        }

        debug!(stage = %Stage::Tasks, unit = %epic.temp_id, tasks = tasks.len(), "epic expanded");
        Ok(tasks)
    }

    async fn generate_subtasks(&self, document: &str, project: &ProjectContext, mut epics: Vec<Epic>) -> Result<Vec<Epic>> {
        let work: Vec<TaskRef<'_>> = epics
            .iter()
            .enumerate()
            .flat_map(|(epic_index, epic)| {
                let epic_context = self.epic_context(epic);
                epic.tasks.iter().enumerate().map(move |(task_index, task)| TaskRef {
                    epic_index,
                    task_index,
                    task,
                    epic_context: epic_context.clone(),
                })
            })
            .collect();
        let positions: Vec<(usize, usize)> = work.iter().map(|item| (item.epic_index, item.task_index)).collect();

        info!(stage = %Stage::Subtasks, tasks = work.len(), limit = SUBTASK_CONCURRENCY, "generating subtasks");

        let slots = fanout::run_bounded(&work, SUBTASK_CONCURRENCY, &self.cancel, |_, item| async move {
            self.subtasks_with_retry(item, project, document)
                .await
                .map_err(|e| e.in_stage(Stage::Subtasks, format!("task {}", item.task.temp_id)))
        })
        .await;
        let subtask_lists = fanout::collect_slots(slots, &self.cancel)?;
        drop(work);

        for ((epic_index, task_index), subtasks) in positions.into_iter().zip(subtask_lists) {
            epics[epic_index].tasks[task_index].subtasks = subtasks;
        }
        info!(stage = %Stage::Subtasks, "stage complete");
        Ok(epics)
    }

    async fn subtasks_with_retry(&self, item: &TaskRef<'_>, project: &ProjectContext, document: &str) -> Result<Vec<Subtask>> {
        let mut attempt = 1;
        loop {
            match self.subtasks_for(item, project, document).await {
                Ok(subtasks) => return Ok(subtasks),
                Err(err) if err.is_retryable() && attempt < SUBTASK_ATTEMPTS => {
                    warn!(
                        stage = %Stage::Subtasks,
                        unit = %item.task.temp_id,
                        attempt,
                        error = %err,
                        "subtask generation failed, retrying"
                    );
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn subtasks_for(&self, item: &TaskRef<'_>, project: &ProjectContext, document: &str) -> Result<Vec<Subtask>> {
        let task = item.task;
        let request = self.request(
            Purpose::Subtasks,
            Some(&task.temp_id),
            prompts::SUBTASKS_SYSTEM,
            prompts::subtasks_prompt(task, &item.epic_context, project, self.config, self.full_document(document)),
        );
        let batch: SubtaskBatch = call::generate_json(self.capability, &request, &self.cancel).await?;

        let mut subtasks = batch.subtasks;
        if subtasks.is_empty() {
            return Err(StructuralError::new(
                format!("epics[{}].tasks[{}].subtasks", item.epic_index, item.task_index),
                format!("task '{}' has empty subtasks array", task.title),
            )
            .into());
        }
        renumber_children(&task.temp_id, subtasks.iter_mut().map(|subtask| (&mut subtask.temp_id, &mut subtask.depends_on)));
        Ok(subtasks)
    }

    fn request(&self, purpose: Purpose, unit: Option<&str>, system: &str, prompt: String) -> GenerationRequest {
        GenerationRequest {
            purpose,
            unit: unit.map(str::to_string),
            model: self.config.model_for(purpose).to_string(),
            system: system.to_string(),
            prompt,
            max_tokens: self.config.max_tokens,
        }
    }

    fn full_document<'d>(&self, document: &'d str) -> Option<&'d str> {
        self.config.full_context.then_some(document)
    }

    fn epic_context(&self, epic: &Epic) -> String {
        if !self.config.propagate_context {
            return String::new();
        }
        epic.context.as_ref().map_or_else(|| epic.description.clone(), |context| context.summary())
    }
}
