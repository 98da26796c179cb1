//! CLI argument definitions.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::{OutputKind, Provider, TestingLevel};
use crate::hierarchy::Priority;

/// Top-level CLI parser for `prd-parser`.
#[derive(Debug, Parser)]
#[command(
    name = "prd-parser",
    version,
    about = "Turn a product requirements document into epics, tasks and subtasks"
)]
pub struct Cli {
    /// The command to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Supported top-level subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Decompose a PRD and hand the hierarchy to an output sink.
    Parse(ParseArgs),
    /// Correct a created issue from feedback and carry the fix to related issues.
    Refine(RefineArgs),
}

/// Flags for `prd-parser parse`. Unset options fall back to the config file,
/// then to built-in defaults.
#[derive(Debug, Clone, Default, Args)]
pub struct ParseArgs {
    /// Markdown PRD to decompose. Optional with `--from-json`.
    #[arg(value_name = "PRD_FILE", required_unless_present = "from_json")]
    pub prd_file: Option<PathBuf>,

    /// Approximate number of epics.
    #[arg(long, value_name = "N")]
    pub epics: Option<usize>,

    /// Approximate tasks per epic.
    #[arg(long, value_name = "N")]
    pub tasks: Option<usize>,

    /// Approximate subtasks per task.
    #[arg(long, value_name = "N")]
    pub subtasks: Option<usize>,

    /// Priority for tasks generated without one.
    #[arg(long, value_name = "P")]
    pub priority: Option<Priority>,

    /// How much testing detail to request.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub testing: Option<TestingLevel>,

    /// Generation backend.
    #[arg(long, value_enum)]
    pub llm: Option<Provider>,

    /// Model for every call.
    #[arg(long, value_name = "M")]
    pub model: Option<String>,

    /// Model for subtask generation only.
    #[arg(long, value_name = "M")]
    pub subtask_model: Option<String>,

    /// Always use the staged generator.
    #[arg(long, conflicts_with = "single_shot")]
    pub multi_stage: bool,

    /// Always generate the hierarchy in one call.
    #[arg(long)]
    pub single_shot: bool,

    /// Line count above which the staged generator is used; 0 disables it.
    #[arg(long, value_name = "N")]
    pub smart_threshold: Option<usize>,

    /// Send the whole document to task and subtask prompts.
    #[arg(long)]
    pub full_context: bool,

    /// Do not carry business context down to tasks and subtasks.
    #[arg(long)]
    pub no_context: bool,

    /// Run the structural review pass after generation.
    #[arg(long)]
    pub review: bool,

    /// Run the advisory gap check after generation.
    #[arg(long)]
    pub validate: bool,

    /// Review the generated epics before tasks are generated.
    #[arg(long)]
    pub interactive: bool,

    /// Where the hierarchy goes.
    #[arg(long, value_enum)]
    pub output: Option<OutputKind>,

    /// File for `--output json`; stdout when omitted.
    #[arg(long, value_name = "PATH")]
    pub output_path: Option<PathBuf>,

    /// Issue id prefix for the beads sink.
    #[arg(long, value_name = "P")]
    pub prefix: Option<String>,

    /// Show what would be created without creating anything.
    #[arg(long)]
    pub dry_run: bool,

    /// Skip generation and continue from a saved hierarchy.
    #[arg(long, value_name = "PATH")]
    pub from_json: Option<PathBuf>,

    /// Save the validated hierarchy before handing it to the sink.
    #[arg(long, value_name = "PATH")]
    pub save_json: Option<PathBuf>,

    /// Config file to use instead of searching for `.prd-parser.yaml`.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

/// Flags for `prd-parser refine`.
#[derive(Debug, Clone, Default, Args)]
pub struct RefineArgs {
    /// Issue to correct, e.g. `prd-e2t1`.
    #[arg(value_name = "ISSUE_ID")]
    pub issue_id: String,

    /// What is wrong with the issue.
    #[arg(short, long, value_name = "TEXT")]
    pub feedback: String,

    /// Leave the issue's children alone.
    #[arg(long)]
    pub no_cascade: bool,

    /// Do not search other issues for the same wrong concepts.
    #[arg(long)]
    pub no_scan_all: bool,

    /// Show the analysis and affected issues without updating anything.
    #[arg(long)]
    pub dry_run: bool,

    /// PRD to ground the correction in.
    #[arg(long, value_name = "PATH")]
    pub prd: Option<PathBuf>,

    /// Generation backend.
    #[arg(long, value_enum)]
    pub llm: Option<Provider>,

    /// Model for every call.
    #[arg(long, value_name = "M")]
    pub model: Option<String>,

    /// Config file to use instead of searching for `.prd-parser.yaml`.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,
}
