//! Replaying adapters that serve recorded interactions.

pub mod generation;

pub use generation::ReplayingGenerator;

/// Decodes an output recorded by `recording::record_result`.
///
/// `{"Ok": "text"}` yields the text. A non-string `Ok` value yields its JSON
/// encoding, which lets hand-written cassettes embed replies as YAML maps.
pub(crate) fn replay_text(
    output: &serde_json::Value,
) -> Result<String, Box<dyn std::error::Error + Send + Sync>> {
    if let Some(ok) = output.get("Ok") {
        return Ok(ok.as_str().map_or_else(|| ok.to_string(), str::to_string));
    }
    if let Some(err) = output.get("Err") {
        let message = err.as_str().map_or_else(|| err.to_string(), str::to_string);
        return Err(message.into());
    }
    Err(format!("recorded output is neither Ok nor Err: {output}").into())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn decodes_every_recorded_shape() {
        assert_eq!(replay_text(&json!({"Ok": "{}"})).unwrap(), "{}");
        assert_eq!(replay_text(&json!({"Ok": {"tasks": []}})).unwrap(), r#"{"tasks":[]}"#);
        assert_eq!(replay_text(&json!({"Err": "rate limited"})).unwrap_err().to_string(), "rate limited");
        assert!(replay_text(&json!({"text": "x"})).is_err());
    }
}
