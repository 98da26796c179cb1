//! `prd-parser parse` command.

use std::path::{Path, PathBuf};

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::adapters::live::filesystem::LiveFileSystem;
use crate::cli::ParseArgs;
use crate::config::{FileConfig, OutputKind, ParseConfig, Provider, DEFAULT_SMART_THRESHOLD};
use crate::context::ServiceContext;
use crate::error::{Error, Result};
use crate::hierarchy::ParseResponse;
use crate::pipeline::epic_review::TerminalEpicReview;
use crate::pipeline::{Pipeline, PipelineOptions, PipelineOutcome, Strategy};
use crate::ports::{CreateResult, FileSystem, Sink};
use crate::sink::{BeadsSink, JsonSink};

/// File name of the automatic checkpoint written when a sink fails.
pub const CHECKPOINT_FILE: &str = "prd-parser-checkpoint.json";

/// Flags merged over the config file merged over defaults.
#[derive(Debug, Clone)]
pub struct ParseSettings {
    /// Prompt and model settings.
    pub config: ParseConfig,
    /// Strategy and post-generation passes.
    pub options: PipelineOptions,
    /// Generation backend.
    pub provider: Provider,
    /// Sink.
    pub output: OutputKind,
}

impl ParseSettings {
    /// Resolves settings from flags and a loaded config file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when the merged settings are invalid.
    pub fn resolve(args: &ParseArgs, file: &FileConfig) -> Result<Self> {
        let defaults = ParseConfig::default();
        let config = ParseConfig {
            target_epics: args.epics.or(file.epics).unwrap_or(defaults.target_epics),
            tasks_per_epic: args.tasks.or(file.tasks_per_epic).unwrap_or(defaults.tasks_per_epic),
            subtasks_per_task: args.subtasks.or(file.subtasks_per_task).unwrap_or(defaults.subtasks_per_task),
            default_priority: args.priority.or(file.priority).unwrap_or(defaults.default_priority),
            testing_level: args.testing.or(file.testing).unwrap_or(defaults.testing_level),
            propagate_context: !args.no_context,
            full_context: args.full_context,
            model: args.model.clone().or_else(|| file.model.clone()).unwrap_or(defaults.model),
            subtask_model: args.subtask_model.clone().or_else(|| file.subtask_model.clone()),
            max_tokens: defaults.max_tokens,
        };
        config.validate()?;

        let strategy = if args.multi_stage {
            Some(Strategy::MultiStage)
        } else if args.single_shot {
            Some(Strategy::SingleShot)
        } else {
            None
        };
        let options = PipelineOptions {
            review: args.review,
            gap_check: args.validate,
            strategy,
            smart_threshold: args.smart_threshold.or(file.smart_threshold).unwrap_or(DEFAULT_SMART_THRESHOLD),
            ..PipelineOptions::default()
        };

        Ok(Self {
            config,
            options,
            provider: args.llm.or(file.llm).unwrap_or_default(),
            output: args.output.or(file.output).unwrap_or_default(),
        })
    }
}

/// Execute the `parse` command.
///
/// # Errors
///
/// Returns config, generation, structural, cancellation and sink errors.
pub async fn run(args: &ParseArgs, cancel: CancellationToken) -> Result<()> {
    let (file, source) = FileConfig::discover(&LiveFileSystem, args.config.as_deref())?;
    if let Some(source) = &source {
        info!(path = %source.display(), "using config file");
    }
    let settings = ParseSettings::resolve(args, &file)?;
    let ctx = super::service_context(settings.provider)?;
    execute(&ctx, args, &settings, cancel).await.map(|_| ())
}

/// Runs the pipeline and hands the result to the selected sink.
///
/// # Errors
///
/// Returns config, generation, structural, cancellation and sink errors. A
/// sink failure first saves the hierarchy to a checkpoint in the temp
/// directory and names it in the error.
pub async fn execute(
    ctx: &ServiceContext,
    args: &ParseArgs,
    settings: &ParseSettings,
    cancel: CancellationToken,
) -> Result<CreateResult> {
    let fs = ctx.fs.as_ref();
    let document = match &args.prd_file {
        Some(path) => read_document(fs, path)?,
        None => String::new(),
    };

    let terminal = args.interactive.then(TerminalEpicReview::stdio);
    let mut pipeline = Pipeline::new(ctx.generator.as_ref(), &settings.config, settings.options.clone(), cancel);
    if let Some(hook) = &terminal {
        pipeline = pipeline.with_epic_review(hook);
    }

    let outcome = match &args.from_json {
        Some(path) => {
            let mut tree = load_checkpoint(fs, path)?;
            tree.fill_default_priority(settings.config.default_priority);
            pipeline.resume(tree, &document).await?
        }
        None => pipeline.run(&document).await?,
    };
    report_passes(&outcome);

    if let Some(path) = &args.save_json {
        save_tree(fs, path, &outcome.tree)?;
        eprintln!("Saved hierarchy to {}", path.display());
    }

    let sink: Box<dyn Sink + '_> = match settings.output {
        OutputKind::Json => Box::new(JsonSink::new(fs, args.output_path.clone(), args.dry_run)),
        OutputKind::Beads => {
            Box::new(BeadsSink::new(ctx.shell.as_ref(), args.prefix.clone().unwrap_or_default(), args.dry_run))
        }
    };
    let result = match deliver(sink.as_ref(), &outcome.tree) {
        Ok(result) => result,
        Err(reason) => return Err(checkpoint_after_failure(fs, &outcome.tree, reason)),
    };

    print_summary(sink.name(), &result);
    Ok(result)
}

/// Where the automatic checkpoint is written.
#[must_use]
pub fn checkpoint_path() -> PathBuf {
    std::env::temp_dir().join(CHECKPOINT_FILE)
}

fn read_document(fs: &dyn FileSystem, path: &Path) -> Result<String> {
    let document = fs
        .read_to_string(path)
        .map_err(|e| Error::Config(format!("failed to read {}: {e}", path.display())))?;
    if document.trim().is_empty() {
        return Err(Error::Usage(format!("{} is empty", path.display())));
    }
    Ok(document)
}

fn load_checkpoint(fs: &dyn FileSystem, path: &Path) -> Result<ParseResponse> {
    let text = fs
        .read_to_string(path)
        .map_err(|e| Error::Config(format!("failed to read {}: {e}", path.display())))?;
    serde_json::from_str(&text)
        .map_err(|e| Error::Config(format!("{} is not a saved hierarchy: {e}", path.display())))
}

fn save_tree(fs: &dyn FileSystem, path: &Path, tree: &ParseResponse) -> Result<()> {
    let rendered = serde_json::to_string_pretty(tree)?;
    fs.write(path, &rendered)
        .map_err(|e| Error::Config(format!("failed to write {}: {e}", path.display())))
}

fn deliver(sink: &dyn Sink, tree: &ParseResponse) -> std::result::Result<CreateResult, String> {
    if !sink.is_available() {
        return Err(format!("{} output is not available", sink.name()));
    }
    sink.create_items(tree).map_err(|e| e.to_string())
}

fn checkpoint_after_failure(fs: &dyn FileSystem, tree: &ParseResponse, reason: String) -> Error {
    let path = checkpoint_path();
    match save_tree(fs, &path, tree) {
        Ok(()) => Error::Sink(format!(
            "{reason}; hierarchy saved to {0}, retry with --from-json {0}",
            path.display()
        )),
        Err(err) => {
            warn!(error = %err, "checkpoint not saved");
            Error::Sink(reason)
        }
    }
}

fn report_passes(outcome: &PipelineOutcome) {
    if let Some(review) = &outcome.review {
        let verdict = if review.was_modified { "applied" } else { "kept original structure" };
        eprintln!("Review {verdict}: {}", review.notes);
    }
    if let Some(report) = &outcome.gaps {
        if report.gaps.is_empty() && report.warnings.is_empty() {
            eprintln!("Gap check: nothing missing");
        }
        for gap in &report.gaps {
            eprintln!("Gap: {gap}");
        }
        for warning in &report.warnings {
            eprintln!("Warning: {warning}");
        }
    }
}

fn print_summary(sink: &str, result: &CreateResult) {
    let stats = result.stats;
    eprintln!("Created via {sink}:");
    eprintln!("  Epics:        {}", stats.epics);
    eprintln!("  Tasks:        {}", stats.tasks);
    eprintln!("  Subtasks:     {}", stats.subtasks);
    eprintln!("  Dependencies: {}", stats.dependencies);
    if !result.failed.is_empty() {
        eprintln!("  Failed:       {}", result.failed.len());
        for item in &result.failed {
            eprintln!("    {} {} {:?}: {}", item.kind, item.temp_id, item.title, item.reason);
        }
    }
}
