//! Generation capability port: text in, text out, fallible.

use std::error::Error;
use std::fmt;
use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

/// Boxed future type alias used by [`GenerationCapability`] to keep the trait
/// dyn-compatible.
pub type GenerationFuture<'a> =
    Pin<Box<dyn Future<Output = Result<String, Box<dyn Error + Send + Sync>>> + Send + 'a>>;

/// What a generation call is for. Used for model selection, logs and replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Purpose {
    /// Whole hierarchy in one call.
    Hierarchy,
    /// Stage 1: project context and epic summaries.
    Epics,
    /// Stage 2: tasks for one epic.
    Tasks,
    /// Stage 3: subtasks for one task.
    Subtasks,
    /// Structural review of a finished tree.
    Review,
    /// Advisory gap check.
    Gaps,
    /// Refine: find what a created issue gets wrong.
    Analyze,
    /// Refine: rewrite a related issue with the corrected framing.
    Correct,
}

impl fmt::Display for Purpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Hierarchy => "hierarchy",
            Self::Epics => "epics",
            Self::Tasks => "tasks",
            Self::Subtasks => "subtasks",
            Self::Review => "review",
            Self::Gaps => "gaps",
            Self::Analyze => "analyze",
            Self::Correct => "correct",
        })
    }
}

/// One call to the generation capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Why the call is made.
    pub purpose: Purpose,
    /// Temp id of the unit of work, when the call is per epic or per task.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    /// Model identifier.
    pub model: String,
    /// System instruction.
    pub system: String,
    /// Task-specific instruction.
    pub prompt: String,
    /// Upper bound on generated tokens.
    pub max_tokens: u32,
}

/// Produces text expected (not guaranteed) to contain one JSON object.
///
/// Implementations may be slow and may fail. Dropping the returned future
/// must abort the underlying call; the pipeline relies on that for
/// cancellation.
pub trait GenerationCapability: Send + Sync {
    /// Runs one generation call.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails (process, network, auth, quota).
    fn generate(&self, request: &GenerationRequest) -> GenerationFuture<'_>;
}
