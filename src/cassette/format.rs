//! Cassette file layout.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One recorded call on a port.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Interaction {
    /// Position in the recording, assigned by the recorder.
    #[serde(default)]
    pub seq: u64,
    /// Port name, e.g. `"generation"`.
    pub port: String,
    /// Method invoked on the port.
    pub method: String,
    /// Fields that identify the call. Replay matches on these.
    #[serde(default)]
    pub input: serde_json::Value,
    /// `{"Ok": value}` or `{"Err": message}`.
    pub output: serde_json::Value,
}

/// A recorded session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Cassette {
    /// Human-readable name.
    pub name: String,
    /// When the session was recorded.
    pub recorded_at: DateTime<Utc>,
    /// Version of the tool that recorded it.
    #[serde(default)]
    pub tool_version: String,
    /// Interactions in completion order.
    #[serde(default)]
    pub interactions: Vec<Interaction>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hand_written_cassettes_may_omit_seq_and_version() {
        let yaml = r#"
name: todo
recorded_at: 2026-01-01T00:00:00Z
interactions:
  - port: generation
    method: generate
    input: {purpose: epics}
    output: {Ok: "{}"}
"#;
        let cassette: Cassette = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cassette.tool_version, "");
        assert_eq!(cassette.interactions[0].seq, 0);
        assert_eq!(cassette.interactions[0].input["purpose"], "epics");
    }
}
