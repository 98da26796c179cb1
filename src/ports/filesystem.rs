//! Filesystem port for documents, checkpoints, config and JSON output.

use std::error::Error;
use std::path::Path;

/// Reads and writes whole UTF-8 files.
pub trait FileSystem: Send + Sync {
    /// Reads the entire contents of a file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file does not exist or is not valid UTF-8.
    fn read_to_string(&self, path: &Path) -> Result<String, Box<dyn Error + Send + Sync>>;

    /// Writes `contents`, creating parent directories and replacing any
    /// existing file.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn write(&self, path: &Path, contents: &str) -> Result<(), Box<dyn Error + Send + Sync>>;

    /// Returns `true` if the path exists.
    fn exists(&self, path: &Path) -> bool;
}
