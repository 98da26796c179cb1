//! Concrete sinks for validated hierarchies.

pub mod beads;
pub mod json;

pub use beads::BeadsSink;
pub use json::JsonSink;
