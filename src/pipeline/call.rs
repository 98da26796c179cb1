//! One generation call: cancellation, progress and decoding.

use std::time::Duration;

use serde::de::DeserializeOwned;
use tokio::time::{interval_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::extract;
use crate::ports::{GenerationCapability, GenerationRequest};

/// How often a still-running call is reported.
pub const PROGRESS_INTERVAL: Duration = Duration::from_secs(10);

/// Runs one call, racing it against `cancel` and logging progress while it
/// is in flight. Cancellation drops the in-flight future.
///
/// # Errors
///
/// Returns [`Error::Cancelled`] or [`Error::Capability`].
pub async fn generate_text(
    capability: &dyn GenerationCapability,
    request: &GenerationRequest,
    cancel: &CancellationToken,
) -> Result<String> {
    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }

    let started = Instant::now();
    let mut call = capability.generate(request);
    let mut progress = interval_at(started + PROGRESS_INTERVAL, PROGRESS_INTERVAL);

    let text = loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(Error::Cancelled),
            result = &mut call => break result.map_err(|e| Error::Capability(e.to_string()))?,
            _ = progress.tick() => info!(
                purpose = %request.purpose,
                unit = request.unit.as_deref().unwrap_or("-"),
                elapsed_secs = started.elapsed().as_secs(),
                "still generating"
            ),
        }
    };

    debug!(
        purpose = %request.purpose,
        unit = request.unit.as_deref().unwrap_or("-"),
        chars = text.len(),
        elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        "generation finished"
    );
    Ok(text)
}

/// [`generate_text`] followed by extraction and decoding into `T`.
///
/// # Errors
///
/// Returns [`Error::Cancelled`], [`Error::Capability`] or [`Error::Parse`].
pub async fn generate_json<T: DeserializeOwned>(
    capability: &dyn GenerationCapability,
    request: &GenerationRequest,
    cancel: &CancellationToken,
) -> Result<T> {
    let text = generate_text(capability, request, cancel).await?;
    extract::parse_json(&text)
}
