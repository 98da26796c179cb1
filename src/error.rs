//! Error types for prd-parser.

use thiserror::Error;

use crate::hierarchy::StructuralError;
use crate::pipeline::Stage;

/// Result type alias using the crate [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can go wrong between reading a document and handing the
/// hierarchy to a sink.
#[derive(Error, Debug)]
pub enum Error {
    /// The generation capability itself failed (process, network, auth).
    #[error("generation failed: {0}")]
    Capability(String),

    /// Generated text held no extractable or decodable JSON.
    #[error("could not parse generated output: {message} (response began: {preview:?})")]
    Parse {
        /// What went wrong.
        message: String,
        /// Leading characters of the offending text.
        preview: String,
    },

    /// JSON decoded but breaks a hierarchy invariant.
    #[error(transparent)]
    Structural(#[from] StructuralError),

    /// A multi-stage unit of work failed; names the stage and the unit.
    #[error("stage {stage} failed for {unit}: {source}")]
    Stage {
        /// Failing stage.
        stage: Stage,
        /// Failing unit, e.g. `epic 2` or `task 1.3`.
        unit: String,
        /// Underlying failure.
        #[source]
        source: Box<Error>,
    },

    /// The caller cancelled the run.
    #[error("operation cancelled")]
    Cancelled,

    /// A sink could not accept the hierarchy.
    #[error("sink error: {0}")]
    Sink(String),

    /// The issue tracker could not be read or updated.
    #[error("issue tracker error: {0}")]
    Tracker(String),

    /// Configuration or invocation problem.
    #[error("configuration error: {0}")]
    Config(String),

    /// Command-line usage problem.
    #[error("{0}")]
    Usage(String),

    /// Filesystem or process I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding failure outside generated text.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML encoding or decoding failure.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl Error {
    /// Stable machine-readable code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Capability(_) => "E_CAPABILITY",
            Self::Parse { .. } => "E_PARSE",
            Self::Structural(_) => "E_STRUCTURAL",
            Self::Stage { source, .. } => source.code(),
            Self::Cancelled => "E_CANCELLED",
            Self::Sink(_) => "E_SINK",
            Self::Tracker(_) => "E_TRACKER",
            Self::Config(_) => "E_CONFIG",
            Self::Usage(_) => "E_USAGE",
            Self::Io(_) => "E_IO",
            Self::Json(_) => "E_JSON",
            Self::Yaml(_) => "E_YAML",
        }
    }

    /// True when the failure is a cancellation, however deeply wrapped.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        match self {
            Self::Cancelled => true,
            Self::Stage { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }

    /// Failures worth another attempt at the same unit of work.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Capability(_) | Self::Parse { .. } | Self::Structural(_))
    }

    /// Wraps this error with the stage and unit it belongs to. Cancellation
    /// stays bare so callers can match on it directly.
    #[must_use]
    pub fn in_stage(self, stage: Stage, unit: impl Into<String>) -> Self {
        if self.is_cancelled() {
            return Self::Cancelled;
        }
        Self::Stage { stage, unit: unit.into(), source: Box::new(self) }
    }

    /// Builds a [`Error::Parse`] with a preview of at most 200 characters.
    pub fn parse(message: impl Into<String>, text: &str) -> Self {
        Self::Parse { message: message.into(), preview: preview(text, 200) }
    }
}

/// First `limit` characters of `text`, with an ellipsis when cut.
#[must_use]
pub fn preview(text: &str, limit: usize) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(limit).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_error_names_stage_and_unit() {
        let err = Error::Capability("rate limited".into()).in_stage(Stage::Tasks, "epic 2");
        assert_eq!(err.to_string(), "stage 2 (tasks) failed for epic 2: generation failed: rate limited");
        assert_eq!(err.code(), "E_CAPABILITY");
    }

    #[test]
    fn cancellation_is_never_wrapped() {
        let err = Error::Cancelled.in_stage(Stage::Subtasks, "task 1.1");
        assert!(matches!(err, Error::Cancelled));
        assert!(!err.is_retryable());
    }

    #[test]
    fn preview_truncates_on_char_boundary() {
        assert_eq!(preview("héllo", 2), "hé...");
        assert_eq!(preview("ok", 200), "ok");
    }
}
