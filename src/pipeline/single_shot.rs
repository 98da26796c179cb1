//! One call for the whole hierarchy. Used for short documents.

use tokio_util::sync::CancellationToken;
use tracing::info;

use super::{call, prompts};
use crate::config::ParseConfig;
use crate::error::Result;
use crate::hierarchy::ParseResponse;
use crate::ports::{GenerationCapability, GenerationRequest, Purpose};

/// Asks for the complete hierarchy in a single generation call.
pub struct SingleShotGenerator<'a> {
    capability: &'a dyn GenerationCapability,
    config: &'a ParseConfig,
    cancel: CancellationToken,
}

impl<'a> SingleShotGenerator<'a> {
    /// Creates a generator over `capability`.
    #[must_use]
    pub fn new(capability: &'a dyn GenerationCapability, config: &'a ParseConfig, cancel: CancellationToken) -> Self {
        Self { capability, config, cancel }
    }

    /// Issues exactly one call, then extracts, decodes and validates.
    /// No retry happens here.
    ///
    /// # Errors
    ///
    /// Propagates capability, parse and structural errors unchanged.
    pub async fn generate(&self, document: &str) -> Result<ParseResponse> {
        let request = GenerationRequest {
            purpose: Purpose::Hierarchy,
            unit: None,
            model: self.config.model_for(Purpose::Hierarchy).to_string(),
            system: prompts::HIERARCHY_SYSTEM.to_string(),
            prompt: prompts::hierarchy_prompt(document, self.config),
            max_tokens: self.config.max_tokens,
        };

        let mut tree: ParseResponse = call::generate_json(self.capability, &request, &self.cancel).await?;
        tree.renumber();
        tree.fill_default_priority(self.config.default_priority);
        tree.refresh_metadata();
        tree.validate()?;

        info!(
            epics = tree.metadata.total_epics,
            tasks = tree.metadata.total_tasks,
            subtasks = tree.metadata.total_subtasks,
            "single-shot hierarchy generated"
        );
        Ok(tree)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;

    use super::*;
    use crate::error::Error;
    use crate::hierarchy::Priority;
    use crate::ports::GenerationFuture;

    struct Canned {
        reply: String,
        calls: AtomicUsize,
    }

    impl Canned {
        fn new(reply: impl Into<String>) -> Self {
            Self { reply: reply.into(), calls: AtomicUsize::new(0) }
        }
    }

    impl GenerationCapability for Canned {
        fn generate(&self, request: &GenerationRequest) -> GenerationFuture<'_> {
            assert_eq!(request.purpose, Purpose::Hierarchy);
            self.calls.fetch_add(1, Ordering::SeqCst);
            let reply = self.reply.clone();
            Box::pin(async move { Ok(reply) })
        }
    }

    #[tokio::test]
    async fn builds_validated_tree_from_one_call() {
        let reply = json!({
            "project": {"product_name": "Todo"},
            "epics": [{
                "temp_id": "1", "title": "Core",
                "tasks": [{"temp_id": "1.1", "title": "Store", "subtasks": [{"temp_id": "1.1.1", "title": "Schema"}]}]
            }]
        });
        let capability = Canned::new(format!("```json\n{reply}\n```"));
        let config = ParseConfig { default_priority: Priority::High, ..Default::default() };

        let tree = SingleShotGenerator::new(&capability, &config, CancellationToken::new())
            .generate("# Todo")
            .await
            .unwrap();

        assert_eq!(capability.calls.load(Ordering::SeqCst), 1);
        assert_eq!(tree.metadata.total_subtasks, 1);
        assert_eq!(tree.epics[0].tasks[0].priority, Some(Priority::High));
    }

    #[tokio::test]
    async fn structural_failure_is_not_retried() {
        let reply = json!({"project": {"product_name": "Todo"}, "epics": [{"temp_id": "1", "title": "Core"}]});
        let capability = Canned::new(reply.to_string());
        let config = ParseConfig::default();

        let err = SingleShotGenerator::new(&capability, &config, CancellationToken::new())
            .generate("# Todo")
            .await
            .expect_err("epic without tasks must fail");

        assert_eq!(capability.calls.load(Ordering::SeqCst), 1);
        assert!(matches!(err, Error::Structural(e) if e.field == "epics[0].tasks"));
    }
}
