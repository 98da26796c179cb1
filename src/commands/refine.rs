//! `prd-parser refine` command.

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::adapters::live::filesystem::LiveFileSystem;
use crate::cli::RefineArgs;
use crate::config::{FileConfig, DEFAULT_MODEL};
use crate::context::ServiceContext;
use crate::error::{preview, Error, Result};
use crate::refine::{RefineReport, RefineRequest, Refiner};

/// Execute the `refine` command.
///
/// # Errors
///
/// Returns config, tracker, generation and cancellation errors.
pub async fn run(args: &RefineArgs, cancel: CancellationToken) -> Result<()> {
    let (file, source) = FileConfig::discover(&LiveFileSystem, args.config.as_deref())?;
    if let Some(source) = &source {
        info!(path = %source.display(), "using config file");
    }
    let ctx = super::service_context(args.llm.or(file.llm).unwrap_or_default())?;
    execute(&ctx, args, &file, cancel).await.map(|_| ())
}

/// Runs refine over the context's ports and prints what changed.
///
/// # Errors
///
/// Returns [`Error::Config`] when the PRD cannot be read, and whatever
/// [`Refiner::refine`] returns.
pub async fn execute(
    ctx: &ServiceContext,
    args: &RefineArgs,
    file: &FileConfig,
    cancel: CancellationToken,
) -> Result<RefineReport> {
    let document = match &args.prd {
        Some(path) => Some(
            ctx.fs
                .read_to_string(path)
                .map_err(|e| Error::Config(format!("failed to read {}: {e}", path.display())))?,
        ),
        None => None,
    };
    let model = args.model.clone().or_else(|| file.model.clone()).unwrap_or_else(|| DEFAULT_MODEL.to_string());

    let request = RefineRequest {
        issue_id: args.issue_id.clone(),
        feedback: args.feedback.clone(),
        document,
        cascade: !args.no_cascade,
        scan_all: !args.no_scan_all,
        dry_run: args.dry_run,
    };
    eprintln!("Refining {}...", request.issue_id);
    let report = Refiner::new(ctx.generator.as_ref(), ctx.shell.as_ref(), model, cancel).refine(&request).await?;

    print_report(&report, args.dry_run);
    Ok(report)
}

fn print_report(report: &RefineReport, dry_run: bool) {
    eprintln!("  Found: {}", report.target.title);
    eprintln!("\nIdentified misalignment:");
    for concept in &report.analysis.wrong_concepts {
        eprintln!("  - {concept}");
    }
    eprintln!("\nCorrected version:");
    eprintln!("  Title: {}", report.analysis.corrected_title);
    eprintln!("  Description: {}", preview(&report.analysis.corrected_description, 100));

    eprintln!("\n--- Changes to apply ---");
    eprintln!("Target: {}", report.target.id);
    for issue in &report.affected {
        eprintln!("  + {}: {}", issue.id, preview(&issue.title, 50));
    }

    if dry_run {
        eprintln!("\n[dry-run] No changes applied");
        return;
    }
    for id in &report.updated {
        eprintln!("  Updated {id}");
    }
    for failure in &report.failed {
        eprintln!("  Warning: {} not updated: {}", failure.id, failure.reason);
    }
    eprintln!("\n--- Summary ---");
    eprintln!("Updated: {} of {} issues", report.updated.len(), report.affected.len() + 1);
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;

    use serde_json::json;

    use super::*;
    use crate::ports::{FileSystem, GenerationCapability, GenerationFuture, GenerationRequest, ShellExecutor, ShellOutput};

    #[derive(Default)]
    struct MemoryFs(Mutex<HashMap<PathBuf, String>>);

    impl FileSystem for MemoryFs {
        fn read_to_string(
            &self,
            path: &Path,
        ) -> std::result::Result<String, Box<dyn std::error::Error + Send + Sync>> {
            self.0.lock().unwrap().get(path).cloned().ok_or_else(|| "missing".into())
        }

        fn write(&self, path: &Path, contents: &str) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
            self.0.lock().unwrap().insert(path.to_path_buf(), contents.to_string());
            Ok(())
        }

        fn exists(&self, path: &Path) -> bool {
            self.0.lock().unwrap().contains_key(path)
        }
    }

    /// `bd` that knows one epic and records updates.
    #[derive(Default)]
    struct OneEpic(Mutex<Vec<Vec<String>>>);

    impl ShellExecutor for OneEpic {
        fn run(
            &self,
            _program: &str,
            args: &[String],
        ) -> std::result::Result<ShellOutput, Box<dyn std::error::Error + Send + Sync>> {
            let epic = json!({"id": "prd-e1", "title": "Deal pipeline", "description": "CRM stages", "issue_type": "epic"});
            let stdout = match args[0].as_str() {
                "show" | "list" => json!([epic]).to_string(),
                _ => {
                    self.0.lock().unwrap().push(args.to_vec());
                    String::new()
                }
            };
            Ok(ShellOutput { exit_code: 0, stdout, stderr: String::new() })
        }
    }

    /// Checks the PRD reached the analysis prompt, then answers.
    struct Grounded;

    impl GenerationCapability for Grounded {
        fn generate(&self, request: &GenerationRequest) -> GenerationFuture<'_> {
            let reply: std::result::Result<String, Box<dyn std::error::Error + Send + Sync>> =
                if request.prompt.contains("voice-first product") {
                    Ok(json!({"wrong_concepts": ["CRM"], "corrected_title": format!("Insights via {}", request.model)})
                        .to_string())
                } else {
                    Err("prd missing from prompt".into())
                };
            Box::pin(async move { reply })
        }
    }

    fn args() -> RefineArgs {
        RefineArgs {
            issue_id: "prd-e1".into(),
            feedback: "Not a CRM".into(),
            prd: Some("prd.md".into()),
            ..RefineArgs::default()
        }
    }

    fn context(shell: OneEpic) -> ServiceContext {
        let fs = MemoryFs::default();
        fs.write(Path::new("prd.md"), "# Herd\nA voice-first product.").unwrap();
        ServiceContext::with_ports(Box::new(fs), Box::new(shell), Box::new(Grounded))
    }

    #[tokio::test]
    async fn config_model_and_document_reach_the_analysis() {
        let ctx = context(OneEpic::default());
        let file = FileConfig { model: Some("haiku".into()), ..FileConfig::default() };

        let report = execute(&ctx, &args(), &file, CancellationToken::new()).await.unwrap();

        assert_eq!(report.analysis.corrected_title, "Insights via haiku");
        assert_eq!(report.updated, ["prd-e1"]);
    }

    #[tokio::test]
    async fn missing_document_is_a_config_error() {
        let ctx = context(OneEpic::default());
        let args = RefineArgs { prd: Some("nope.md".into()), ..args() };

        let err = execute(&ctx, &args, &FileConfig::default(), CancellationToken::new()).await.unwrap_err();

        assert!(matches!(err, Error::Config(msg) if msg.contains("nope.md")));
    }
}
