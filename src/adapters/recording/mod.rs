//! Recording adapters that capture interactions to cassettes.

pub mod generation;

use std::sync::{Arc, Mutex};

use serde::Serialize;
use tracing::warn;

use crate::cassette::recorder::CassetteRecorder;

pub use generation::RecordingGenerator;

/// Records a `Result<T, E>` interaction.
///
/// `Ok(v)` is stored as `{"Ok": v}` and `Err(e)` as `{"Err": e.to_string()}`.
/// Recording problems are logged and never affect the call itself.
pub(crate) fn record_result<T, E, I>(
    recorder: &Arc<Mutex<CassetteRecorder>>,
    port: &str,
    method: &str,
    input: &I,
    result: &Result<T, E>,
) where
    T: Serialize,
    E: std::fmt::Display,
    I: Serialize,
{
    let output = match result {
        Ok(value) => serde_json::to_value(value).map(|inner| serde_json::json!({ "Ok": inner })),
        Err(e) => Ok(serde_json::json!({ "Err": e.to_string() })),
    };
    let encoded = serde_json::to_value(input).and_then(|input| output.map(|output| (input, output)));

    match (encoded, recorder.lock()) {
        (Ok((input, output)), Ok(mut guard)) => guard.record(port, method, input, output),
        (Err(err), _) => warn!(port, method, error = %err, "interaction not recorded"),
        (_, Err(_)) => warn!(port, method, "recorder lock poisoned, interaction not recorded"),
    }
}
