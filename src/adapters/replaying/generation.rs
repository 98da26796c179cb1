//! Replaying adapter for the generation port.

use std::sync::{Arc, Mutex};

use super::replay_text;
use crate::adapters::recording::generation::{CallKey, METHOD, PORT};
use crate::cassette::replayer::CassetteReplayer;
use crate::ports::{GenerationCapability, GenerationFuture, GenerationRequest};

/// Serves recorded generation calls from a cassette.
pub struct ReplayingGenerator {
    replayer: Arc<Mutex<CassetteReplayer>>,
}

impl ReplayingGenerator {
    /// Creates a generator backed by `replayer`.
    #[must_use]
    pub fn new(replayer: Arc<Mutex<CassetteReplayer>>) -> Self {
        Self { replayer }
    }
}

impl GenerationCapability for ReplayingGenerator {
    fn generate(&self, request: &GenerationRequest) -> GenerationFuture<'_> {
        let key = serde_json::to_value(CallKey::from(request));
        let unit = request.unit.clone().unwrap_or_else(|| "-".to_string());
        let purpose = request.purpose;

        let reply = match (key, self.replayer.lock()) {
            (Ok(key), Ok(mut replayer)) => match replayer.take_matching(PORT, METHOD, &key) {
                Some(interaction) => replay_text(&interaction.output),
                None => Err(format!("cassette has no unused call for purpose={purpose} unit={unit}").into()),
            },
            (Err(err), _) => Err(err.into()),
            (_, Err(_)) => Err("cassette replayer lock poisoned".into()),
        };
        Box::pin(async move { reply })
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use serde_json::json;

    use super::*;
    use crate::cassette::format::{Cassette, Interaction};
    use crate::ports::Purpose;

    fn generator() -> ReplayingGenerator {
        let interaction = |seq, unit: &str, reply: &str| Interaction {
            seq,
            port: PORT.into(),
            method: METHOD.into(),
            input: json!({"purpose": "tasks", "unit": unit}),
            output: json!({ "Ok": reply }),
        };
        let cassette = Cassette {
            name: "test".into(),
            recorded_at: Utc::now(),
            tool_version: String::new(),
            interactions: vec![interaction(0, "1", "first"), interaction(1, "2", "second")],
        };
        ReplayingGenerator::new(Arc::new(Mutex::new(CassetteReplayer::new(&cassette))))
    }

    fn request(unit: &str) -> GenerationRequest {
        GenerationRequest {
            purpose: Purpose::Tasks,
            unit: Some(unit.into()),
            model: "m".into(),
            system: "s".into(),
            prompt: "p".into(),
            max_tokens: 10,
        }
    }

    #[tokio::test]
    async fn serves_by_unit_and_reports_exhaustion() {
        let generator = generator();
        assert_eq!(generator.generate(&request("2")).await.unwrap(), "second");
        assert_eq!(generator.generate(&request("1")).await.unwrap(), "first");

        let err = generator.generate(&request("1")).await.unwrap_err();
        assert!(err.to_string().contains("purpose=tasks unit=1"));
    }
}
