//! Prompts for the refine command.

use std::fmt::Write as _;

use super::{Analysis, Issue};
use crate::error::preview;

/// Leading characters of the PRD included as grounding.
pub const DOCUMENT_EXCERPT_CHARS: usize = 4000;

/// Finds what a created issue gets wrong and rewrites it.
pub const ANALYZE_SYSTEM: &str = "\
You analyze misaligned project issues and generate corrections.

Given an issue and user feedback about what is wrong:
1. Identify the WRONG CONCEPTS: phrases, terms or framing that are incorrect.
2. Identify the CORRECT CONCEPTS that should replace them.
3. Write a corrected title and description.

Return JSON:
{
  \"wrong_concepts\": [\"pipeline tracking\", \"CRM management\"],
  \"correct_concepts\": [\"conversation insights\", \"voice intelligence\"],
  \"corrected_title\": \"...\",
  \"corrected_description\": \"...\"
}

Wrong concepts are used to search other issues, so name them exactly as \
they appear. Keep the corrected content as long and detailed as the \
original; only fix the framing.";

/// Rewrites a related issue given the concepts found by the analysis.
pub const CORRECT_SYSTEM: &str = "\
You fix misaligned concepts in project issues.

Given an issue and a list of wrong concepts with their replacements, write \
a corrected version that keeps the original structure and only fixes the \
framing.

Return JSON: {\"corrected_title\": \"...\", \"corrected_description\": \"...\"}";

/// Prompt for analyzing `issue` against the user's `feedback`.
#[must_use]
pub fn analyze_prompt(issue: &Issue, feedback: &str, document: Option<&str>) -> String {
    let mut prompt = format!(
        "Analyze this issue and fix the misalignment.\n\n\
         ISSUE ID: {}\nISSUE TYPE: {}\nCURRENT TITLE: {}\nCURRENT DESCRIPTION:\n{}\n\n\
         USER FEEDBACK (what's wrong):\n{feedback}\n",
        issue.id, issue.kind, issue.title, issue.description
    );
    if let Some(document) = document.filter(|text| !text.trim().is_empty()) {
        let _ = write!(
            prompt,
            "\nORIGINAL PRD (for correct context):\n{}\n",
            preview(document, DOCUMENT_EXCERPT_CHARS)
        );
    }
    prompt.push_str(
        "\nReturn JSON with wrong_concepts, correct_concepts, corrected_title, and corrected_description.",
    );
    prompt
}

/// Prompt for correcting a related `issue` with the concepts in `analysis`.
#[must_use]
pub fn correct_prompt(issue: &Issue, analysis: &Analysis) -> String {
    format!(
        "Fix this issue by replacing wrong concepts with correct ones.\n\n\
         WRONG CONCEPTS (replace these):\n{}\n\n\
         CORRECT CONCEPTS (use these instead):\n{}\n\n\
         ISSUE TO FIX:\nID: {}\nTitle: {}\nDescription: {}\n\n\
         Return JSON with corrected_title and corrected_description.\n\
         Keep the same structure and detail level, just fix the conceptual framing.",
        bullets(&analysis.wrong_concepts),
        bullets(&analysis.correct_concepts),
        issue.id,
        issue.title,
        issue.description
    )
}

fn bullets(items: &[String]) -> String {
    if items.is_empty() {
        return "- (none)".to_string();
    }
    items.iter().map(|item| format!("- {item}")).collect::<Vec<_>>().join("\n")
}
