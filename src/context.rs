//! Service context bundling the port trait objects a command needs.

use std::path::Path;
use std::sync::{Arc, Mutex};

use tracing::{info, warn};

use crate::adapters::live::filesystem::LiveFileSystem;
use crate::adapters::live::shell::LiveShellExecutor;
use crate::adapters::live::select_generator;
use crate::adapters::recording::RecordingGenerator;
use crate::adapters::replaying::ReplayingGenerator;
use crate::cassette;
use crate::cassette::recorder::CassetteRecorder;
use crate::cassette::replayer::CassetteReplayer;
use crate::config::Provider;
use crate::error::Result;
use crate::ports::{FileSystem, GenerationCapability, ShellExecutor};

/// Bundles the ports into a single context.
///
/// Constructors wire up live, recording or replaying generation. The
/// filesystem and process ports are always live.
pub struct ServiceContext {
    /// Filesystem for documents, checkpoints and output.
    pub fs: Box<dyn FileSystem>,
    /// Process runner for sinks that drive external tools.
    pub shell: Box<dyn ShellExecutor>,
    /// Text generation backend.
    pub generator: Box<dyn GenerationCapability>,
    /// Cassette written when the context is dropped.
    recorder: Option<Arc<Mutex<CassetteRecorder>>>,
}

impl ServiceContext {
    /// Live generation through `provider`.
    #[must_use]
    pub fn live(provider: Provider) -> Self {
        Self::with_ports(Box::new(LiveFileSystem), Box::new(LiveShellExecutor), select_generator(provider))
    }

    /// Live generation whose calls are recorded to a cassette at `path`.
    ///
    /// The cassette is written when this context is dropped, including after
    /// a failed run.
    #[must_use]
    pub fn recording(provider: Provider, path: &Path) -> Self {
        let recorder = Arc::new(Mutex::new(CassetteRecorder::new(path, "prd-parser-session")));
        let generator = RecordingGenerator::new(select_generator(provider), Arc::clone(&recorder));
        let mut ctx = Self::with_ports(Box::new(LiveFileSystem), Box::new(LiveShellExecutor), Box::new(generator));
        ctx.recorder = Some(recorder);
        ctx
    }

    /// Generation served from the cassette at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the cassette cannot be read or parsed.
    pub fn replaying(path: &Path) -> Result<Self> {
        let fs = LiveFileSystem;
        let cassette = cassette::load(&fs, path)?;
        info!(cassette = %path.display(), interactions = cassette.interactions.len(), "replaying generation calls");
        let replayer = Arc::new(Mutex::new(CassetteReplayer::new(&cassette)));
        Ok(Self::with_ports(Box::new(fs), Box::new(LiveShellExecutor), Box::new(ReplayingGenerator::new(replayer))))
    }

    /// Context over explicit ports.
    #[must_use]
    pub fn with_ports(
        fs: Box<dyn FileSystem>,
        shell: Box<dyn ShellExecutor>,
        generator: Box<dyn GenerationCapability>,
    ) -> Self {
        Self { fs, shell, generator, recorder: None }
    }
}

impl Drop for ServiceContext {
    fn drop(&mut self) {
        let Some(recorder) = self.recorder.take() else {
            return;
        };
        let Ok(guard) = recorder.lock() else {
            warn!("recorder lock poisoned, cassette not written");
            return;
        };
        match guard.write(self.fs.as_ref()) {
            Ok(()) => eprintln!("Recording saved to: {}", guard.path().display()),
            Err(err) => warn!(error = %err, "cassette not written"),
        }
    }
}
