//! Parse settings and the optional `.prd-parser.yaml` file.
//!
//! Precedence is flags, then the config file, then built-in defaults. The
//! file is looked up in the working directory first and the home directory
//! second, unless a path is given explicitly.

use std::path::{Path, PathBuf};

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::hierarchy::Priority;
use crate::ports::{FileSystem, Purpose};

/// Config file name searched for in the working and home directories.
pub const CONFIG_FILE_NAME: &str = ".prd-parser.yaml";

/// Model used when neither flags nor config name one.
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";

/// Generation budget per call.
pub const DEFAULT_MAX_TOKENS: u32 = 16_000;

/// Documents longer than this many lines use the multi-stage generator.
pub const DEFAULT_SMART_THRESHOLD: usize = 300;

/// How much testing detail to ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TestingLevel {
    /// Critical paths only.
    Minimal,
    /// Unit and integration tests for main features.
    Standard,
    /// Every applicable dimension at every level.
    #[default]
    Comprehensive,
}

impl TestingLevel {
    /// Lowercase name used in prompts.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Minimal => "minimal",
            Self::Standard => "standard",
            Self::Comprehensive => "comprehensive",
        }
    }
}

/// Which generation backend to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Provider {
    /// Claude CLI, then Codex CLI, then the API when a key is set.
    #[default]
    Auto,
    /// The `claude` command-line tool.
    ClaudeCli,
    /// The `codex` command-line tool.
    CodexCli,
    /// The Anthropic Messages API.
    AnthropicApi,
}

/// Where the finished hierarchy goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputKind {
    /// The `bd` issue tracker.
    #[default]
    Beads,
    /// A JSON file or stdout.
    Json,
}

/// Knobs that shape prompts and model selection.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseConfig {
    /// Approximate number of epics to ask for.
    pub target_epics: usize,
    /// Approximate tasks per epic.
    pub tasks_per_epic: usize,
    /// Approximate subtasks per task.
    pub subtasks_per_task: usize,
    /// Priority for tasks that come back without one.
    pub default_priority: Priority,
    /// Testing detail.
    pub testing_level: TestingLevel,
    /// Carry business context down to tasks and subtasks.
    pub propagate_context: bool,
    /// Send the whole document to stage 2 and stage 3 prompts.
    pub full_context: bool,
    /// Model for every call except subtasks when `subtask_model` is set.
    pub model: String,
    /// Optional cheaper model for stage 3.
    pub subtask_model: Option<String>,
    /// Generation budget per call.
    pub max_tokens: u32,
}

impl Default for ParseConfig {
    fn default() -> Self {
        Self {
            target_epics: 3,
            tasks_per_epic: 5,
            subtasks_per_task: 4,
            default_priority: Priority::Medium,
            testing_level: TestingLevel::Comprehensive,
            propagate_context: true,
            full_context: false,
            model: DEFAULT_MODEL.to_string(),
            subtask_model: None,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }
}

impl ParseConfig {
    /// Model to use for a call of the given purpose.
    #[must_use]
    pub fn model_for(&self, purpose: Purpose) -> &str {
        match (purpose, &self.subtask_model) {
            (Purpose::Subtasks, Some(model)) => model,
            _ => &self.model,
        }
    }

    /// Rejects zero targets and empty model names.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the bad setting.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("epics", self.target_epics),
            ("tasks_per_epic", self.tasks_per_epic),
            ("subtasks_per_task", self.subtasks_per_task),
        ] {
            if value == 0 {
                return Err(Error::Config(format!("{name} must be at least 1")));
            }
        }
        if self.model.trim().is_empty() {
            return Err(Error::Config("model must not be empty".into()));
        }
        Ok(())
    }
}

/// Contents of `.prd-parser.yaml`. Every key is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    /// Generation backend.
    pub llm: Option<Provider>,
    /// Main model.
    pub model: Option<String>,
    /// Stage 3 model.
    pub subtask_model: Option<String>,
    /// Target epics.
    pub epics: Option<usize>,
    /// Target tasks per epic.
    pub tasks_per_epic: Option<usize>,
    /// Target subtasks per task.
    pub subtasks_per_task: Option<usize>,
    /// Default task priority.
    pub priority: Option<Priority>,
    /// Testing detail.
    pub testing: Option<TestingLevel>,
    /// Sink.
    pub output: Option<OutputKind>,
    /// Line count above which multi-stage is used.
    pub smart_threshold: Option<usize>,
}

impl FileConfig {
    /// Loads the config at `explicit`, or the first `.prd-parser.yaml` found
    /// in the working directory then the home directory. Missing files yield
    /// the empty config.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when an explicit path is missing or a file
    /// cannot be read or parsed.
    pub fn discover(fs: &dyn FileSystem, explicit: Option<&Path>) -> Result<(Self, Option<PathBuf>)> {
        if let Some(path) = explicit {
            if !fs.exists(path) {
                return Err(Error::Config(format!("config file {} not found", path.display())));
            }
            return Ok((Self::load(fs, path)?, Some(path.to_path_buf())));
        }

        let candidates = std::iter::once(PathBuf::from(CONFIG_FILE_NAME))
            .chain(dirs::home_dir().map(|home| home.join(CONFIG_FILE_NAME)));
        for path in candidates {
            if fs.exists(&path) {
                let config = Self::load(fs, &path)?;
                debug!(path = %path.display(), "loaded config file");
                return Ok((config, Some(path)));
            }
        }
        Ok((Self::default(), None))
    }

    /// Parses one config file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when the file cannot be read or parsed.
    pub fn load(fs: &dyn FileSystem, path: &Path) -> Result<Self> {
        let contents = fs
            .read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read {}: {e}", path.display())))?;
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(&contents)
            .map_err(|e| Error::Config(format!("failed to parse {}: {e}", path.display())))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct MemoryFs(Mutex<HashMap<PathBuf, String>>);

    impl FileSystem for MemoryFs {
        fn read_to_string(
            &self,
            path: &Path,
        ) -> std::result::Result<String, Box<dyn std::error::Error + Send + Sync>> {
            self.0.lock().unwrap().get(path).cloned().ok_or_else(|| "missing".into())
        }
        fn write(
            &self,
            path: &Path,
            contents: &str,
        ) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
            self.0.lock().unwrap().insert(path.to_path_buf(), contents.to_string());
            Ok(())
        }
        fn exists(&self, path: &Path) -> bool {
            self.0.lock().unwrap().contains_key(path)
        }
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = ParseConfig::default();
        assert_eq!(config.target_epics, 3);
        assert_eq!(config.tasks_per_epic, 5);
        assert_eq!(config.subtasks_per_task, 4);
        assert_eq!(config.default_priority, Priority::Medium);
        assert_eq!(config.testing_level, TestingLevel::Comprehensive);
        assert!(config.propagate_context);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn subtask_model_only_applies_to_stage_three() {
        let config = ParseConfig { subtask_model: Some("haiku".into()), ..Default::default() };
        assert_eq!(config.model_for(Purpose::Subtasks), "haiku");
        assert_eq!(config.model_for(Purpose::Tasks), DEFAULT_MODEL);
    }

    #[test]
    fn zero_targets_are_rejected() {
        let config = ParseConfig { tasks_per_epic: 0, ..Default::default() };
        assert!(matches!(config.validate(), Err(Error::Config(msg)) if msg.contains("tasks_per_epic")));
    }

    #[test]
    fn loads_explicit_yaml() {
        let fs = MemoryFs::default();
        let path = PathBuf::from("/cfg/custom.yaml");
        fs.write(&path, "llm: anthropic-api\nepics: 6\npriority: high\ntesting: minimal\noutput: json\n")
            .unwrap();

        let (config, found) = FileConfig::discover(&fs, Some(&path)).unwrap();
        assert_eq!(found, Some(path));
        assert_eq!(config.llm, Some(Provider::AnthropicApi));
        assert_eq!(config.epics, Some(6));
        assert_eq!(config.priority, Some(Priority::High));
        assert_eq!(config.testing, Some(TestingLevel::Minimal));
        assert_eq!(config.output, Some(OutputKind::Json));
    }

    #[test]
    fn codex_provider_is_kebab_case() {
        let config: FileConfig = serde_yaml::from_str("llm: codex-cli\n").unwrap();
        assert_eq!(config.llm, Some(Provider::CodexCli));
        assert_eq!(Provider::CodexCli.to_possible_value().unwrap().get_name(), "codex-cli");
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let fs = MemoryFs::default();
        let result = FileConfig::discover(&fs, Some(Path::new("/nope.yaml")));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let fs = MemoryFs::default();
        let path = PathBuf::from("/cfg/typo.yaml");
        fs.write(&path, "epicz: 3\n").unwrap();
        assert!(FileConfig::load(&fs, &path).is_err());
    }
}
