//! Port traits defining external boundaries.
//!
//! Each trait is a boundary between the pipeline and something outside it:
//! the text generator, the destination of the hierarchy, the filesystem and
//! external processes. Implementations live in `src/adapters/` and
//! `src/sink/`.

pub mod filesystem;
pub mod generation;
pub mod shell;
pub mod sink;

pub use filesystem::FileSystem;
pub use generation::{GenerationCapability, GenerationFuture, GenerationRequest, Purpose};
pub use shell::{ShellExecutor, ShellOutput};
pub use sink::{CreateResult, CreatedItem, DependencyEdge, EdgeKind, FailedItem, ItemKind, Sink};
