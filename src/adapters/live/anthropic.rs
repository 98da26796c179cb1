//! Generation over the Anthropic Messages API.

use std::env;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::ports::generation::{GenerationCapability, GenerationFuture, GenerationRequest};

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Environment variable holding the API key.
pub const API_KEY_VAR: &str = "ANTHROPIC_API_KEY";

/// Calls the Messages API with the request's system and user prompt.
pub struct AnthropicApi {
    client: Client,
}

impl AnthropicApi {
    /// Creates a client. The API key is read per call.
    #[must_use]
    pub fn new() -> Self {
        Self { client: Client::new() }
    }

    /// True when an API key is present in the environment.
    #[must_use]
    pub fn has_key() -> bool {
        env::var(API_KEY_VAR).is_ok_and(|key| !key.trim().is_empty())
    }
}

impl Default for AnthropicApi {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: [Message<'a>; 1],
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
    usage: Usage,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct Usage {
    input_tokens: u32,
    output_tokens: u32,
}

#[derive(Deserialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: String,
}

impl GenerationCapability for AnthropicApi {
    fn generate(&self, request: &GenerationRequest) -> GenerationFuture<'_> {
        let request = request.clone();

        Box::pin(async move {
            let api_key = env::var(API_KEY_VAR)
                .map_err(|_| format!("{API_KEY_VAR} environment variable not set"))?;

            let body = MessagesRequest {
                model: &request.model,
                max_tokens: request.max_tokens,
                system: &request.system,
                messages: [Message { role: "user", content: &request.prompt }],
            };

            let response = self
                .client
                .post(ANTHROPIC_API_URL)
                .header("x-api-key", &api_key)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .json(&body)
                .send()
                .await
                .map_err(|e| format!("Anthropic API request failed: {e}"))?;

            let status = response.status();
            let response_text =
                response.text().await.map_err(|e| format!("Failed to read Anthropic API response: {e}"))?;

            if !status.is_success() {
                let msg = serde_json::from_str::<ApiError>(&response_text)
                    .map(|e| e.error.message)
                    .unwrap_or(response_text);
                return Err(format!("Anthropic API error ({}): {msg}", status.as_u16()).into());
            }

            let parsed: MessagesResponse = serde_json::from_str(&response_text)
                .map_err(|e| format!("Failed to parse Anthropic API response: {e}"))?;

            debug!(
                purpose = %request.purpose,
                input_tokens = parsed.usage.input_tokens,
                output_tokens = parsed.usage.output_tokens,
                stop_reason = parsed.stop_reason.as_deref().unwrap_or("unknown"),
                "anthropic call finished"
            );
            Ok::<_, Box<dyn std::error::Error + Send + Sync>>(
                parsed.content.into_iter().map(|block| block.text).collect::<String>(),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_body_carries_system_prompt() {
        let body = MessagesRequest {
            model: "m",
            max_tokens: 16_000,
            system: "You are a planner.",
            messages: [Message { role: "user", content: "# PRD" }],
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["system"], "You are a planner.");
        assert_eq!(value["messages"][0]["content"], "# PRD");
    }

    #[test]
    fn response_text_blocks_concatenate() {
        let parsed: MessagesResponse = serde_json::from_str(
            r#"{"content":[{"type":"text","text":"{\"a\":"},{"type":"text","text":"1}"}],
                "stop_reason":"end_turn","usage":{"input_tokens":3,"output_tokens":4}}"#,
        )
        .unwrap();
        let text: String = parsed.content.into_iter().map(|b| b.text).collect();
        assert_eq!(text, r#"{"a":1}"#);
    }
}
