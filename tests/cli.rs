//! Integration tests for top-level CLI behavior.
//!
//! Generation is served from hand-written cassettes via `PRD_PARSER_REPLAY`,
//! so no backend is needed.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

const TODO_PRD: &str = "# Todo App\n## Features\n1. Create todo\n2. Complete todo\n";

const SINGLE_SHOT_CASSETTE: &str = r#"
name: todo-single-shot
recorded_at: 2026-01-01T00:00:00Z
interactions:
  - port: generation
    method: generate
    input: {purpose: hierarchy}
    output:
      Ok:
        project: {product_name: Todo App, tech_stack: [Rust]}
        epics:
          - temp_id: "1"
            title: Todos
            tasks:
              - temp_id: "1.1"
                title: Create todo
                priority: high
                subtasks:
                  - {temp_id: "1.1.1", title: Model}
                  - {temp_id: "1.1.2", title: Handler, depends_on: ["1.1.1"]}
              - temp_id: "1.2"
                title: Complete todo
                subtasks:
                  - {temp_id: "1.2.1", title: Toggle}
                  - {temp_id: "1.2.2", title: Persist}
"#;

const MULTI_STAGE_CASSETTE: &str = r#"
name: todo-multi-stage
recorded_at: 2026-01-01T00:00:00Z
interactions:
  - port: generation
    method: generate
    input: {purpose: epics}
    output:
      Ok:
        project: {product_name: Todo App}
        epics:
          - {temp_id: "1", title: Storage}
          - {temp_id: "2", title: Interface, depends_on: ["1"]}
  - port: generation
    method: generate
    input: {purpose: tasks, unit: "2"}
    output:
      Ok: {tasks: [{title: List view}]}
  - port: generation
    method: generate
    input: {purpose: tasks, unit: "1"}
    output:
      Ok: {tasks: [{title: Schema}, {title: Queries}]}
  - port: generation
    method: generate
    input: {purpose: subtasks}
    output:
      Ok: "```json\n{\"subtasks\": [{\"title\": \"Write it\"}, {\"title\": \"Test it\"}]}\n```"
  - port: generation
    method: generate
    input: {purpose: subtasks}
    output:
      Ok: {subtasks: [{title: Write it}]}
  - port: generation
    method: generate
    input: {purpose: subtasks}
    output:
      Ok: {subtasks: [{title: Write it}]}
"#;

struct Workspace {
    root: PathBuf,
}

impl Workspace {
    fn new(name: &str) -> Self {
        let root = std::env::temp_dir().join(format!("prd_parser_cli_{name}_{}", std::process::id()));
        let _ = fs::remove_dir_all(&root);
        fs::create_dir_all(&root).unwrap();
        Self { root }
    }

    fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.root.join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    fn path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    fn run(&self, cassette: Option<&Path>, args: &[&str]) -> std::process::Output {
        let bin = env!("CARGO_BIN_EXE_prd-parser");
        let mut command = Command::new(bin);
        command
            .args(args)
            .current_dir(&self.root)
            .env("HOME", &self.root)
            .env("RUST_LOG", "prd_parser=warn")
            .env_remove("PRD_PARSER_RECORD")
            .env_remove("PRD_PARSER_REPLAY");
        if let Some(cassette) = cassette {
            command.env("PRD_PARSER_REPLAY", cassette);
        }
        command.output().expect("failed to run prd-parser binary")
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.root);
    }
}

fn stderr(output: &std::process::Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn single_shot_replay_writes_json_file() {
    let ws = Workspace::new("single");
    ws.write("prd.md", TODO_PRD);
    let cassette = ws.write("cassette.yaml", SINGLE_SHOT_CASSETTE);

    let output = ws.run(Some(&cassette), &["parse", "prd.md", "--output", "json", "--output-path", "out.json"]);

    assert!(output.status.success(), "{}", stderr(&output));
    let tree: serde_json::Value = serde_json::from_str(&fs::read_to_string(ws.path("out.json")).unwrap()).unwrap();
    assert_eq!(tree["metadata"]["total_epics"], 1);
    assert_eq!(tree["metadata"]["total_tasks"], 2);
    assert_eq!(tree["metadata"]["total_subtasks"], 4);
    assert_eq!(tree["epics"][0]["tasks"][0]["priority"], "high");
    assert_eq!(tree["epics"][0]["tasks"][1]["priority"], "medium");
    assert!(stderr(&output).contains("Subtasks:     4"));
}

#[test]
fn multi_stage_replay_prints_json_to_stdout() {
    let ws = Workspace::new("multi");
    ws.write("prd.md", TODO_PRD);
    ws.write(".prd-parser.yaml", "output: json\n");
    let cassette = ws.write("cassette.yaml", MULTI_STAGE_CASSETTE);

    let output = ws.run(Some(&cassette), &["parse", "prd.md", "--multi-stage"]);

    assert!(output.status.success(), "{}", stderr(&output));
    let tree: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(tree["epics"][0]["title"], "Storage");
    assert_eq!(tree["epics"][0]["tasks"][1]["temp_id"], "1.2");
    assert_eq!(tree["epics"][1]["tasks"][0]["title"], "List view");
    assert_eq!(tree["metadata"]["total_tasks"], 3);
    assert!(tree["metadata"]["total_subtasks"].as_u64().unwrap() >= 3);
}

#[test]
fn checkpoint_resume_needs_no_generation() {
    let ws = Workspace::new("resume");
    let checkpoint = r#"{"project": {"product_name": "Todo App"},
        "epics": [{"temp_id": "1", "title": "Todos",
                   "tasks": [{"temp_id": "1.1", "title": "Create", "subtasks": [{"temp_id": "1.1.1", "title": "Model"}]}]}]}"#;
    ws.write("tree.json", checkpoint);

    let output = ws.run(None, &["parse", "--from-json", "tree.json", "--output", "json", "--dry-run", "--llm", "anthropic-api"]);

    assert!(output.status.success(), "{}", stderr(&output));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("[dry-run] Would write:"));
    assert!(stdout.contains("\"total_subtasks\": 1"));
}

#[test]
fn invalid_checkpoint_names_the_failing_field() {
    let ws = Workspace::new("invalid");
    ws.write("tree.json", r#"{"project": {"product_name": "Todo App"}, "epics": [{"temp_id": "1", "title": "Todos", "tasks": []}]}"#);

    let output = ws.run(None, &["parse", "--from-json", "tree.json", "--output", "json"]);

    assert!(!output.status.success());
    assert!(stderr(&output).contains("epics[0].tasks"), "{}", stderr(&output));
}

#[test]
fn missing_document_is_reported() {
    let ws = Workspace::new("missing");
    let output = ws.run(None, &["parse", "nope.md", "--output", "json"]);

    assert!(!output.status.success());
    assert!(stderr(&output).contains("failed to read nope.md"));
}

#[test]
fn parse_help_shows_usage() {
    let ws = Workspace::new("help");
    let output = ws.run(None, &["parse", "--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success());
    assert!(stdout.contains("PRD_FILE"));
    assert!(stdout.contains("--from-json"));
    assert!(stdout.contains("--multi-stage"));
}

#[test]
fn refine_help_shows_feedback_and_cascade_flags() {
    let ws = Workspace::new("refine_help");
    let output = ws.run(None, &["refine", "--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success());
    assert!(stdout.contains("ISSUE_ID"));
    assert!(stdout.contains("--feedback"));
    assert!(stdout.contains("--no-cascade"));
}

#[test]
fn invalid_subcommand_exits_with_error() {
    let ws = Workspace::new("unknown");
    let output = ws.run(None, &["nonsense"]);

    assert!(!output.status.success());
    assert!(stderr(&output).contains("unrecognized subcommand"));
}
