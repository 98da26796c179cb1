//! Pulls the JSON object out of raw generated text.
//!
//! The pipeline is: unwrap a capability envelope, strip markdown fences,
//! take the span from the first `{` to the last `}`, decode. New transports
//! with other envelope shapes only need another branch in [`unwrap_envelope`].

use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::{Error, Result};

/// Envelope emitted by CLI front-ends in JSON output mode.
#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    result: String,
    #[serde(default)]
    is_error: bool,
}

/// Returns the JSON object text contained in `raw`.
///
/// # Errors
///
/// Returns [`Error::Capability`] when an envelope reports an error and
/// [`Error::Parse`] when no `{...}` span exists.
pub fn extract_json(raw: &str) -> Result<String> {
    let text = raw.trim();
    if text.is_empty() {
        return Err(Error::parse("empty response", raw));
    }

    let text = unwrap_envelope(text)?;
    let text = strip_fences(text.trim());

    match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if end > start => Ok(text[start..=end].to_string()),
        _ => Err(Error::parse("no JSON object found", raw)),
    }
}

/// Extracts and decodes the JSON object in `raw` into `T`.
///
/// # Errors
///
/// Returns [`Error::Parse`] when extraction or decoding fails.
pub fn parse_json<T: DeserializeOwned>(raw: &str) -> Result<T> {
    let json = extract_json(raw)?;
    serde_json::from_str(&json).map_err(|e| Error::parse(format!("invalid JSON: {e}"), raw))
}

fn unwrap_envelope(text: &str) -> Result<String> {
    if !text.starts_with('{') {
        return Ok(text.to_string());
    }
    match serde_json::from_str::<Envelope>(text) {
        Ok(envelope) if envelope.is_error => {
            Err(Error::Capability(format!("{} reported an error: {}", envelope.kind, envelope.result)))
        }
        Ok(envelope) => Ok(envelope.result),
        Err(_) => Ok(text.to_string()),
    }
}

fn strip_fences(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Drop the info string (`json`, `JSON`, ...) on the opening line.
    let body = match rest.find('\n') {
        Some(newline) if !rest[..newline].contains('{') => &rest[newline + 1..],
        _ => rest.trim_start_matches(|c: char| c.is_ascii_alphabetic()),
    };
    match body.rfind("```") {
        Some(end) => body[..end].trim(),
        None => body.trim(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::*;

    #[test]
    fn plain_object_passes_through() {
        assert_eq!(extract_json(r#"  {"a": 1}  "#).unwrap(), r#"{"a": 1}"#);
    }

    #[test]
    fn strips_json_fence() {
        let raw = "```json\n{\"epics\": []}\n```";
        assert_eq!(extract_json(raw).unwrap(), "{\"epics\": []}");
    }

    #[test]
    fn strips_bare_fence_and_prose() {
        let raw = "Here you go:\n```\n{\"tasks\": [1]}\n```\nLet me know!";
        let value: Value = parse_json(raw).unwrap();
        assert_eq!(value, json!({"tasks": [1]}));
    }

    #[test]
    fn unwraps_cli_envelope() {
        let inner = "```json\n{\"subtasks\": []}\n```";
        let raw = json!({"type": "result", "result": inner, "is_error": false}).to_string();
        assert_eq!(extract_json(&raw).unwrap(), "{\"subtasks\": []}");
    }

    #[test]
    fn envelope_error_is_a_capability_failure() {
        let raw = json!({"type": "result", "result": "quota exceeded", "is_error": true}).to_string();
        assert!(matches!(extract_json(&raw), Err(Error::Capability(msg)) if msg.contains("quota exceeded")));
    }

    #[test]
    fn missing_object_reports_preview() {
        let raw = "I could not do that. ".repeat(20);
        match extract_json(&raw) {
            Err(Error::Parse { message, preview }) => {
                assert_eq!(message, "no JSON object found");
                assert!(preview.ends_with("..."));
                assert!(preview.chars().count() <= 203);
            }
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn truncated_object_fails_to_decode() {
        let result: Result<Value> = parse_json("{\"epics\": [ {\"title\": \"x\" }");
        assert!(matches!(result, Err(Error::Parse { .. })));
    }
}
