//! Generation pipeline: pick a strategy, build the tree, then run the
//! optional review and gap passes.

pub mod call;
pub mod epic_review;
pub mod fanout;
pub mod gaps;
pub mod multistage;
pub mod prompts;
pub mod review;
pub mod single_shot;

use std::fmt;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::{ParseConfig, DEFAULT_SMART_THRESHOLD};
use crate::error::Result;
use crate::hierarchy::ParseResponse;
use crate::ports::GenerationCapability;
use epic_review::EpicReview;
use gaps::{GapReport, GapValidator};
use multistage::MultiStageGenerator;
use review::StructuralReviewer;
use single_shot::SingleShotGenerator;

/// Multi-stage generation phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Project context and epics from the document.
    Epics,
    /// Tasks for each epic.
    Tasks,
    /// Subtasks for each task.
    Subtasks,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Epics => "1 (epics)",
            Self::Tasks => "2 (tasks)",
            Self::Subtasks => "3 (subtasks)",
        })
    }
}

/// How the hierarchy is generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// One call for the whole tree.
    SingleShot,
    /// Epics, then tasks, then subtasks.
    MultiStage,
}

impl Strategy {
    /// Uses `forced` when given, otherwise multi-stage for documents longer
    /// than `threshold` lines. A zero threshold disables the switch.
    #[must_use]
    pub fn choose(document: &str, threshold: usize, forced: Option<Self>) -> Self {
        forced.unwrap_or_else(|| {
            if threshold > 0 && document.lines().count() > threshold {
                Self::MultiStage
            } else {
                Self::SingleShot
            }
        })
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::SingleShot => "single-shot",
            Self::MultiStage => "multi-stage",
        })
    }
}

/// Knobs that sit around generation rather than inside it.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Run the structural review pass.
    pub review: bool,
    /// Run the advisory gap check.
    pub gap_check: bool,
    /// Forced strategy; `None` selects by document length.
    pub strategy: Option<Strategy>,
    /// Line count above which multi-stage is selected.
    pub smart_threshold: usize,
    /// Whole-call attempts for single-shot generation.
    pub single_shot_attempts: usize,
    /// Base delay between single-shot attempts, multiplied by the attempt.
    pub retry_backoff: Duration,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            review: false,
            gap_check: false,
            strategy: None,
            smart_threshold: DEFAULT_SMART_THRESHOLD,
            single_shot_attempts: 3,
            retry_backoff: Duration::from_secs(2),
        }
    }
}

/// What the review pass reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewNotes {
    /// Whether the merged tree was accepted.
    pub was_modified: bool,
    /// Reviewer notes or a rejection diagnostic.
    pub notes: String,
}

/// Result of a pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    /// The final, validated tree.
    pub tree: ParseResponse,
    /// Strategy used; `None` when resuming from a checkpoint.
    pub strategy: Option<Strategy>,
    /// Review summary when the review ran and returned.
    pub review: Option<ReviewNotes>,
    /// Gap findings when the gap check ran and returned.
    pub gaps: Option<GapReport>,
}

/// Runs generation and the post-generation passes over one capability.
pub struct Pipeline<'a> {
    capability: &'a dyn GenerationCapability,
    config: &'a ParseConfig,
    options: PipelineOptions,
    cancel: CancellationToken,
    epic_review: Option<&'a dyn EpicReview>,
}

impl<'a> Pipeline<'a> {
    /// Creates a pipeline.
    #[must_use]
    pub fn new(
        capability: &'a dyn GenerationCapability,
        config: &'a ParseConfig,
        options: PipelineOptions,
        cancel: CancellationToken,
    ) -> Self {
        Self { capability, config, options, cancel, epic_review: None }
    }

    /// Pauses multi-stage runs after stage 1 for `hook`.
    #[must_use]
    pub fn with_epic_review(mut self, hook: &'a dyn EpicReview) -> Self {
        self.epic_review = Some(hook);
        self
    }

    /// Generates a tree from `document` and runs the enabled passes.
    ///
    /// # Errors
    ///
    /// Returns generation, structural and cancellation errors. Review and gap
    /// failures are logged and do not fail the run.
    pub async fn run(&self, document: &str) -> Result<PipelineOutcome> {
        let strategy = Strategy::choose(document, self.options.smart_threshold, self.options.strategy);
        info!(
            %strategy,
            lines = document.lines().count(),
            threshold = self.options.smart_threshold,
            "generation strategy selected"
        );

        let tree = match strategy {
            Strategy::SingleShot => self.single_shot(document).await?,
            Strategy::MultiStage => {
                let generator = MultiStageGenerator::new(self.capability, self.config, self.cancel.clone());
                let generator = match self.epic_review {
                    Some(hook) => generator.with_epic_review(hook),
                    None => generator,
                };
                generator.generate(document).await?
            }
        };

        let mut outcome = self.finish(tree, document).await?;
        outcome.strategy = Some(strategy);
        Ok(outcome)
    }

    /// Continues from a saved tree: validates it, then runs the enabled
    /// passes without generating anything.
    ///
    /// # Errors
    ///
    /// Returns a structural error when the saved tree is invalid.
    pub async fn resume(&self, mut tree: ParseResponse, document: &str) -> Result<PipelineOutcome> {
        tree.refresh_metadata();
        tree.validate()?;
        info!(epics = tree.metadata.total_epics, "resuming from saved hierarchy");
        self.finish(tree, document).await
    }

    async fn single_shot(&self, document: &str) -> Result<ParseResponse> {
        let generator = SingleShotGenerator::new(self.capability, self.config, self.cancel.clone());
        let attempts = self.options.single_shot_attempts.max(1);
        let mut attempt = 1;
        loop {
            match generator.generate(document).await {
                Ok(tree) => return Ok(tree),
                Err(err) if err.is_retryable() && attempt < attempts => {
                    let delay = self.options.retry_backoff * u32::try_from(attempt).unwrap_or(u32::MAX);
                    warn!(attempt, error = %err, delay_secs = delay.as_secs(), "single-shot generation failed, retrying");
                    tokio::select! {
                        biased;
                        () = self.cancel.cancelled() => return Err(crate::error::Error::Cancelled),
                        () = tokio::time::sleep(delay) => {}
                    }
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn finish(&self, mut tree: ParseResponse, document: &str) -> Result<PipelineOutcome> {
        let mut review = None;
        if self.options.review {
            let reviewer = StructuralReviewer::new(self.capability, self.config, self.cancel.clone());
            match reviewer.review_and_fix(&tree, document).await {
                Ok(outcome) => {
                    tree = outcome.tree;
                    review = Some(ReviewNotes { was_modified: outcome.was_modified, notes: outcome.notes });
                }
                Err(err) if err.is_cancelled() => return Err(err),
                Err(err) => warn!(error = %err, "structural review failed, keeping generated structure"),
            }
        }

        let mut gaps = None;
        if self.options.gap_check {
            let validator = GapValidator::new(self.capability, self.config, self.cancel.clone());
            match validator.validate(&tree, document).await {
                Ok(report) => gaps = Some(report),
                Err(err) if err.is_cancelled() => return Err(err),
                Err(err) => warn!(error = %err, "gap check failed, skipping"),
            }
        }

        Ok(PipelineOutcome { tree, strategy: None, review, gaps })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;

    use super::*;
    use crate::error::Error;
    use crate::ports::{GenerationFuture, GenerationRequest, Purpose};

    const TREE: &str = r#"{"project":{"product_name":"Todo"},"epics":[{"temp_id":"1","title":"Core",
        "tasks":[{"temp_id":"1.1","title":"Store","subtasks":[{"temp_id":"1.1.1","title":"Schema"}]}]}]}"#;

    /// Fails the first `failures` hierarchy calls, then answers with [`TREE`].
    /// Review and gap calls fail.
    struct Flaky {
        failures: usize,
        hierarchy_calls: AtomicUsize,
        other_calls: AtomicUsize,
    }

    impl Flaky {
        fn new(failures: usize) -> Self {
            Self { failures, hierarchy_calls: AtomicUsize::new(0), other_calls: AtomicUsize::new(0) }
        }
    }

    impl GenerationCapability for Flaky {
        fn generate(&self, request: &GenerationRequest) -> GenerationFuture<'_> {
            let reply: std::result::Result<String, Box<dyn std::error::Error + Send + Sync>> =
                if request.purpose == Purpose::Hierarchy {
                    let call = self.hierarchy_calls.fetch_add(1, Ordering::SeqCst);
                    if call < self.failures {
                        Ok("I could not do that".to_string())
                    } else {
                        Ok(TREE.to_string())
                    }
                } else {
                    self.other_calls.fetch_add(1, Ordering::SeqCst);
                    Err("review backend down".into())
                };
            Box::pin(async move { reply })
        }
    }

    #[test]
    fn stage_display_names_number_and_phase() {
        assert_eq!(Stage::Tasks.to_string(), "2 (tasks)");
    }

    #[test]
    fn long_documents_select_multi_stage() {
        let long = "line\n".repeat(301);
        assert_eq!(Strategy::choose(&long, 300, None), Strategy::MultiStage);
        assert_eq!(Strategy::choose("# short", 300, None), Strategy::SingleShot);
        assert_eq!(Strategy::choose(&long, 300, Some(Strategy::SingleShot)), Strategy::SingleShot);
        assert_eq!(Strategy::choose(&long, 0, None), Strategy::SingleShot);
    }

    #[tokio::test(start_paused = true)]
    async fn single_shot_retries_whole_call() {
        let capability = Flaky::new(2);
        let config = ParseConfig::default();
        let options = PipelineOptions::default();

        let outcome =
            Pipeline::new(&capability, &config, options, CancellationToken::new()).run("# Todo").await.unwrap();

        assert_eq!(capability.hierarchy_calls.load(Ordering::SeqCst), 3);
        assert_eq!(outcome.strategy, Some(Strategy::SingleShot));
    }

    #[tokio::test(start_paused = true)]
    async fn single_shot_gives_up_after_three_attempts() {
        let capability = Flaky::new(5);
        let config = ParseConfig::default();
        let options = PipelineOptions::default();

        let err = Pipeline::new(&capability, &config, options, CancellationToken::new())
            .run("# Todo")
            .await
            .expect_err("every attempt fails");

        assert!(matches!(err, Error::Parse { .. }));
        assert_eq!(capability.hierarchy_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn failed_review_and_gap_check_keep_the_tree() {
        let capability = Flaky::new(0);
        let config = ParseConfig::default();
        let options = PipelineOptions { review: true, gap_check: true, ..Default::default() };

        let outcome =
            Pipeline::new(&capability, &config, options, CancellationToken::new()).run("# Todo").await.unwrap();

        assert_eq!(capability.other_calls.load(Ordering::SeqCst), 2);
        assert!(outcome.review.is_none());
        assert!(outcome.gaps.is_none());
        assert_eq!(outcome.tree.epics[0].title, "Core");
    }

    #[tokio::test]
    async fn resume_rejects_invalid_checkpoint_without_generating() {
        let capability = Flaky::new(0);
        let config = ParseConfig::default();
        let tree: ParseResponse =
            serde_json::from_value(json!({"project": {"product_name": "Todo"}, "epics": [{"temp_id": "1", "title": "Core"}]}))
                .unwrap();

        let err = Pipeline::new(&capability, &config, PipelineOptions::default(), CancellationToken::new())
            .resume(tree, "")
            .await
            .expect_err("epic without tasks");

        assert!(matches!(err, Error::Structural(e) if e.field == "epics[0].tasks"));
        assert_eq!(capability.other_calls.load(Ordering::SeqCst), 0);
    }
}
