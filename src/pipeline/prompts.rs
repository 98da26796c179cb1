//! System instructions and prompt builders for every generation call.

use std::fmt::Write as _;

use crate::config::{ParseConfig, TestingLevel};
use crate::hierarchy::{ContextPayload, Epic, ProjectContext, Task};

const JSON_ONLY: &str = "\
Respond with a single JSON object and nothing else: no markdown fences, no \
commentary. Start with { and end with }.";

/// Single-shot: the whole hierarchy in one response.
pub const HIERARCHY_SYSTEM: &str = "\
You turn product requirements documents into an implementation plan.

Return a JSON object with three keys:
- \"project\": product_name, elevator_pitch, target_audience, business_goals, \
user_goals, tech_stack, constraints, brand_guidelines.
- \"epics\": array of epics. Each epic has temp_id (\"1\", \"2\", ...), title, \
description, context, acceptance_criteria, testing, depends_on, \
estimated_days, labels and a non-empty \"tasks\" array.
- Each task has temp_id (\"1.1\"), title, description, context, design_notes, \
testing, priority (critical, high, medium, low, very-low), depends_on, \
estimated_hours, labels and a non-empty \"subtasks\" array.
- Each subtask has temp_id (\"1.1.1\"), title, description, context, testing, \
estimated_minutes, depends_on, labels.
- \"testing\" objects have optional unit_tests, integration_tests, type_tests, \
e2e_tests strings.

Rules:
- The first epic sets up the project: environment, dependencies, build.
- Every feature gets a way for users to see it working.
- Sequences end with a verification step.
- Subtasks are concrete enough to implement without clarification.
- depends_on only references temp_ids that exist.";

/// Stage 1: project context and epic summaries.
pub const EPICS_SYSTEM: &str = "\
You extract the epic structure of a product requirements document. Do not \
produce tasks or subtasks; those are generated later.

Return a JSON object with:
- \"project\": product_name, elevator_pitch, target_audience, business_goals, \
user_goals, tech_stack, constraints, brand_guidelines.
- \"epics\": array of epics with temp_id (\"1\", \"2\", ...), title, \
description, context, acceptance_criteria, testing, depends_on, \
estimated_days, labels. No \"tasks\" key.

Rules:
- Epics are independently deliverable milestones, foundation first.
- The first epic covers project setup.
- Acceptance criteria are verifiable; include at least one \"can run or \
demonstrate X\".";

/// Stage 2: tasks for one epic.
pub const TASKS_SYSTEM: &str = "\
You break one epic into tasks. Do not produce subtasks; those come later.

Return {\"tasks\": [...]} where each task has temp_id (epic id + \".\" + \
number, e.g. \"1.1\"), title, description, context, design_notes, testing, \
priority (critical, high, medium, low, very-low), depends_on (other task \
temp_ids), estimated_hours, labels.

Rules:
- Tasks are two to eight hours of work.
- Carry forward why the work matters to the business.
- Include operational work: installing dependencies, migrations, code \
generation.
- Pair backend work with a visible interface.
- End related sequences with a verification task.";

/// Stage 3: subtasks for one task.
pub const SUBTASKS_SYSTEM: &str = "\
You break one task into atomic subtasks.

Return {\"subtasks\": [...]} where each subtask has temp_id (task id + \".\" \
+ number, e.g. \"1.1.1\"), title, description, context, testing, \
estimated_minutes, depends_on, labels.

Rules:
- Subtasks are thirty minutes to two hours of work.
- Be specific enough to implement without clarification.
- Do not skip practical steps such as installing packages or running builds.
- The last subtask verifies the task works.";

/// Structural review of a finished tree.
pub const REVIEW_SYSTEM: &str = "\
You review the structure of an implementation plan. You see only ids, \
titles and dependency edges.

Check and fix:
- A foundation epic with temp_id \"1\" exists and covers setup. If missing, \
add it and renumber the rest.
- Every other epic depends on \"1\".
- Dependency edges reflect real ordering; no cycles; no references to ids \
that do not exist.
- Tasks inside an epic depend on earlier tasks where order matters.

Return {\"review_notes\": \"...\", \"project\": {...}, \"epics\": [...]} with \
the same skeleton shape you were given. Keep temp_ids of items you did not \
change. If nothing needs fixing, set review_notes to \"No changes needed\".";

/// Advisory gap check.
pub const GAPS_SYSTEM: &str = "\
You check an implementation plan for practical gaps a developer would hit.

Look for:
- Missing setup: project initialization, dependency installation, environment.
- Missing build steps: code generation, migrations, compilation.
- Features without an interface a user can see.
- Missing verification: running tests, starting the app, checking output.
- Dependencies used before they are installed.
- Work ordered before the work it needs.

Return {\"is_valid\": bool, \"gaps\": [\"...\"], \"warnings\": [\"...\"]}. \
Gaps are blocking omissions; warnings are worth a look.";

fn testing_guidance(level: TestingLevel) -> &'static str {
    match level {
        TestingLevel::Minimal => "only the critical paths need tests",
        TestingLevel::Standard => "unit and integration tests for the main features",
        TestingLevel::Comprehensive => "every applicable testing dimension at every level",
    }
}

fn join_or(items: &[String], empty: &str) -> String {
    if items.is_empty() {
        empty.to_string()
    } else {
        items.join(", ")
    }
}

fn context_line(context: Option<&ContextPayload>) -> String {
    context.map(ContextPayload::summary).unwrap_or_default()
}

/// User prompt for the single-shot generator.
#[must_use]
pub fn hierarchy_prompt(document: &str, config: &ParseConfig) -> String {
    let mut prompt = String::new();
    let _ = writeln!(prompt, "Turn this document into a complete plan.\n");
    let _ = writeln!(prompt, "Target epics: about {}", config.target_epics);
    let _ = writeln!(prompt, "Tasks per epic: about {}", config.tasks_per_epic);
    let _ = writeln!(prompt, "Subtasks per task: about {}", config.subtasks_per_task);
    let _ = writeln!(prompt, "Default priority: {}", config.default_priority);
    let _ = writeln!(
        prompt,
        "Testing level: {} ({})",
        config.testing_level.as_str(),
        testing_guidance(config.testing_level)
    );
    if config.propagate_context {
        let _ = writeln!(prompt, "Carry business context from epics down to every subtask.");
    }
    let _ = writeln!(prompt, "\n---\nDOCUMENT:\n---\n{document}\n---\n\n{JSON_ONLY}");
    prompt
}

/// Stage 1 user prompt.
#[must_use]
pub fn epics_prompt(document: &str, config: &ParseConfig) -> String {
    let mut prompt = String::new();
    let _ = writeln!(prompt, "Extract epics from this document.\n");
    let _ = writeln!(prompt, "Target epics: about {} (adjust to the document)", config.target_epics);
    let _ = writeln!(prompt, "Default priority: {}", config.default_priority);
    let _ = writeln!(prompt, "Testing level: {}", config.testing_level.as_str());
    let _ = writeln!(prompt, "\n---\nDOCUMENT:\n---\n{document}\n---\n");
    let _ = writeln!(prompt, "Return \"project\" and \"epics\" only. {JSON_ONLY}");
    prompt
}

/// Stage 2 user prompt for one epic.
#[must_use]
pub fn tasks_prompt(
    epic: &Epic,
    project: &ProjectContext,
    config: &ParseConfig,
    document: Option<&str>,
) -> String {
    let mut prompt = String::new();
    let _ = writeln!(prompt, "Break this epic into tasks.\n\nEPIC:");
    let _ = writeln!(prompt, "- ID: {}", epic.temp_id);
    let _ = writeln!(prompt, "- Title: {}", epic.title);
    let _ = writeln!(prompt, "- Description: {}", epic.description);
    if config.propagate_context {
        let _ = writeln!(prompt, "- Context: {}", context_line(epic.context.as_ref()));
    }
    let _ = writeln!(prompt, "- Acceptance criteria: {}", join_or(&epic.acceptance_criteria, "none given"));
    let _ = writeln!(prompt, "\nPROJECT:");
    let _ = writeln!(prompt, "- Product: {}", project.product_name);
    let _ = writeln!(prompt, "- Target users: {}", project.target_audience);
    let _ = writeln!(prompt, "- Tech stack: {}", join_or(&project.tech_stack, "not specified"));
    let _ = writeln!(prompt, "\nTarget tasks: about {}", config.tasks_per_epic);
    let _ = writeln!(prompt, "Default priority: {}", config.default_priority);
    let _ = writeln!(prompt, "Testing level: {}", config.testing_level.as_str());
    if let Some(document) = document {
        let _ = writeln!(prompt, "\n---\nFULL DOCUMENT:\n---\n{document}\n---");
    }
    let _ = writeln!(prompt, "\nReturn {{\"tasks\": [...]}} without subtasks. {JSON_ONLY}");
    prompt
}

/// Stage 3 user prompt for one task.
#[must_use]
pub fn subtasks_prompt(
    task: &Task,
    epic_context: &str,
    project: &ProjectContext,
    config: &ParseConfig,
    document: Option<&str>,
) -> String {
    let mut prompt = String::new();
    let _ = writeln!(prompt, "Break this task into subtasks.\n\nTASK:");
    let _ = writeln!(prompt, "- ID: {}", task.temp_id);
    let _ = writeln!(prompt, "- Title: {}", task.title);
    let _ = writeln!(prompt, "- Description: {}", task.description);
    if config.propagate_context {
        let _ = writeln!(prompt, "- Context: {}", context_line(task.context.as_ref()));
    }
    if let Some(notes) = &task.design_notes {
        let _ = writeln!(prompt, "- Design notes: {notes}");
    }
    if config.propagate_context && !epic_context.is_empty() {
        let _ = writeln!(prompt, "\nEPIC CONTEXT: {epic_context}");
    }
    let _ = writeln!(prompt, "\nPROJECT:");
    let _ = writeln!(prompt, "- Product: {}", project.product_name);
    let _ = writeln!(prompt, "- Target users: {}", project.target_audience);
    let _ = writeln!(prompt, "\nTarget subtasks: about {}", config.subtasks_per_task);
    let _ = writeln!(prompt, "Testing level: {}", config.testing_level.as_str());
    if let Some(document) = document {
        let _ = writeln!(prompt, "\n---\nFULL DOCUMENT:\n---\n{document}\n---");
    }
    let _ = writeln!(prompt, "\nReturn {{\"subtasks\": [...]}}. {JSON_ONLY}");
    prompt
}

/// Review prompt around a skeleton projection of the tree.
#[must_use]
pub fn review_prompt(skeleton_json: &str, tech_stack: &[String], document: &str) -> String {
    let mut prompt = String::new();
    let _ = writeln!(prompt, "Review this plan structure.\n");
    let _ = writeln!(prompt, "Tech stack: {}\n", join_or(tech_stack, "Not specified"));
    let _ = writeln!(prompt, "STRUCTURE:\n{skeleton_json}\n");
    let _ = writeln!(prompt, "---\nSOURCE DOCUMENT:\n---\n{document}\n---\n\n{JSON_ONLY}");
    prompt
}

/// Gap-check prompt around a plan summary.
#[must_use]
pub fn gaps_prompt(summary: &str, document: &str) -> String {
    let mut prompt = String::new();
    let _ = writeln!(prompt, "Check this plan for practical gaps.\n");
    let _ = writeln!(prompt, "PLAN:\n{summary}");
    let _ = writeln!(prompt, "---\nSOURCE DOCUMENT:\n---\n{document}\n---\n\n{JSON_ONLY}");
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hierarchy_prompt_carries_targets() {
        let config = ParseConfig { target_epics: 1, tasks_per_epic: 2, subtasks_per_task: 2, ..Default::default() };
        let prompt = hierarchy_prompt("# Todo App", &config);
        assert!(prompt.contains("Target epics: about 1"));
        assert!(prompt.contains("Subtasks per task: about 2"));
        assert!(prompt.contains("# Todo App"));
    }

    #[test]
    fn tasks_prompt_includes_document_only_in_full_context() {
        let epic = Epic { temp_id: "2".into(), title: "Sync".into(), ..Default::default() };
        let project = ProjectContext { product_name: "Todo".into(), ..Default::default() };
        let config = ParseConfig::default();

        let lean = tasks_prompt(&epic, &project, &config, None);
        assert!(lean.contains("- ID: 2"));
        assert!(lean.contains("Tech stack: not specified"));
        assert!(!lean.contains("FULL DOCUMENT"));

        let full = tasks_prompt(&epic, &project, &config, Some("whole prd"));
        assert!(full.contains("FULL DOCUMENT"));
    }

    #[test]
    fn subtasks_prompt_omits_context_when_disabled() {
        let task = Task { temp_id: "1.1".into(), title: "Store".into(), ..Default::default() };
        let project = ProjectContext::default();
        let config = ParseConfig { propagate_context: false, ..Default::default() };
        let prompt = subtasks_prompt(&task, "retention matters", &project, &config, None);
        assert!(!prompt.contains("EPIC CONTEXT"));
        assert!(prompt.contains("- ID: 1.1"));
    }
}
