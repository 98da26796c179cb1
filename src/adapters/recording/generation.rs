//! Recording adapter for the generation port.

use std::sync::{Arc, Mutex};

use serde::Serialize;

use super::record_result;
use crate::cassette::recorder::CassetteRecorder;
use crate::ports::{GenerationCapability, GenerationFuture, GenerationRequest, Purpose};

/// Port name used in cassettes.
pub const PORT: &str = "generation";
/// Method name used in cassettes.
pub const METHOD: &str = "generate";

/// Fields a replay matches on.
#[derive(Serialize)]
pub(crate) struct CallKey<'a> {
    pub(crate) purpose: Purpose,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) unit: Option<&'a str>,
}

impl<'a> From<&'a GenerationRequest> for CallKey<'a> {
    fn from(request: &'a GenerationRequest) -> Self {
        Self { purpose: request.purpose, unit: request.unit.as_deref() }
    }
}

/// Records every call while delegating to an inner capability.
pub struct RecordingGenerator {
    inner: Box<dyn GenerationCapability>,
    recorder: Arc<Mutex<CassetteRecorder>>,
}

impl RecordingGenerator {
    /// Wraps `inner`, appending each finished call to `recorder`.
    pub fn new(inner: Box<dyn GenerationCapability>, recorder: Arc<Mutex<CassetteRecorder>>) -> Self {
        Self { inner, recorder }
    }
}

impl GenerationCapability for RecordingGenerator {
    fn generate(&self, request: &GenerationRequest) -> GenerationFuture<'_> {
        let request = request.clone();
        Box::pin(async move {
            let result = self.inner.generate(&request).await;
            record_result(&self.recorder, PORT, METHOD, &CallKey::from(&request), &result);
            result
        })
    }
}
