//! Structural validation of a completed hierarchy.

use thiserror::Error;

use super::ParseResponse;

/// First structural violation found in a tree.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("validation error: {field} - {message}")]
pub struct StructuralError {
    /// Path of the offending field, e.g. `epics[2].tasks`.
    pub field: String,
    /// What is wrong with it.
    pub message: String,
}

impl StructuralError {
    /// Creates an error for the given field path.
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self { field: field.into(), message: message.into() }
    }
}

/// Checks, in order: product name, epics present, each epic's title and
/// tasks, each task's title and subtasks. Stops at the first violation.
///
/// # Errors
///
/// Returns a [`StructuralError`] naming the first offending field.
pub fn validate(tree: &ParseResponse) -> Result<(), StructuralError> {
    if tree.project.product_name.trim().is_empty() {
        return Err(StructuralError::new("project.product_name", "required"));
    }
    if tree.epics.is_empty() {
        return Err(StructuralError::new("epics", "at least one epic required"));
    }

    for (i, epic) in tree.epics.iter().enumerate() {
        if epic.title.trim().is_empty() {
            return Err(StructuralError::new(
                format!("epics[{i}].title"),
                format!("epic '{}' has no title", epic.temp_id),
            ));
        }
        if epic.tasks.is_empty() {
            return Err(StructuralError::new(
                format!("epics[{i}].tasks"),
                format!("epic '{}' has empty tasks array", epic.title),
            ));
        }
        for (j, task) in epic.tasks.iter().enumerate() {
            if task.title.trim().is_empty() {
                return Err(StructuralError::new(
                    format!("epics[{i}].tasks[{j}].title"),
                    format!("task '{}' has no title", task.temp_id),
                ));
            }
            if task.subtasks.is_empty() {
                return Err(StructuralError::new(
                    format!("epics[{i}].tasks[{j}].subtasks"),
                    format!("task '{}' has empty subtasks array", task.title),
                ));
            }
        }
    }

    Ok(())
}
