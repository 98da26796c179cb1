//! Record and replay of generation calls.

pub mod format;
pub mod recorder;
pub mod replayer;

use std::path::Path;

use crate::error::{Error, Result};
use crate::ports::FileSystem;
use format::Cassette;

/// Reads and parses a cassette file.
///
/// # Errors
///
/// Returns a configuration error naming the file when it cannot be read or
/// parsed.
pub fn load(fs: &dyn FileSystem, path: &Path) -> Result<Cassette> {
    let content = fs
        .read_to_string(path)
        .map_err(|e| Error::Config(format!("cannot read cassette {}: {e}", path.display())))?;
    serde_yaml::from_str(&content).map_err(|e| Error::Config(format!("cannot parse cassette {}: {e}", path.display())))
}
