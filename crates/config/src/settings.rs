//! Main settings module

use std::path::{Path, PathBuf};

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::{AgentConfig, ConfigError, InputConfig, InputMode, LlmConfig, LlmProvider, OutputConfig};

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub agent: AgentConfig,

    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub input: InputConfig,

    #[serde(default)]
    pub output: OutputConfig,

    #[serde(default)]
    pub persistence: PersistenceConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// Storage engine for turns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PersistenceBackend {
    /// SQLite file on disk
    #[default]
    Sqlite,
    /// Process memory, lost on exit
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    #[serde(default)]
    pub backend: PersistenceBackend,

    /// SQLite database file
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Timeout for a single store operation
    #[serde(default = "default_persistence_timeout")]
    pub timeout_secs: u64,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("data/conversation_history.db")
}
fn default_persistence_timeout() -> u64 {
    5
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            backend: PersistenceBackend::default(),
            db_path: default_db_path(),
            timeout_secs: default_persistence_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level used when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Emit logs as JSON
    #[serde(default)]
    pub log_json: bool,

    /// Address for the Prometheus exporter, e.g. `127.0.0.1:9000`
    #[serde(default)]
    pub metrics_addr: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_json: false,
            metrics_addr: None,
        }
    }
}

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

impl Settings {
    /// Create default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate settings, reporting every violated precondition
    pub fn validate(&self) -> Result<(), ConfigError> {
        let problems = self.problems();
        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(problems))
        }
    }

    /// Collect all configuration problems
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        self.check_agent(&mut problems);
        self.check_llm(&mut problems);
        self.check_io(&mut problems);
        self.check_persistence(&mut problems);

        let level = self.observability.log_level.to_lowercase();
        if !LOG_LEVELS.contains(&level.as_str()) {
            problems.push(format!(
                "observability.log_level: expected one of {:?}, got '{}'",
                LOG_LEVELS, self.observability.log_level
            ));
        }

        problems
    }

    fn check_agent(&self, problems: &mut Vec<String>) {
        let agent = &self.agent;
        let hotword = agent.hotword.trim().to_lowercase();
        let endword = agent.endword.trim().to_lowercase();

        if hotword.is_empty() {
            problems.push("agent.hotword: must not be empty".to_string());
        }
        if endword.is_empty() {
            problems.push("agent.endword: must not be empty".to_string());
        }
        if !hotword.is_empty() && hotword == endword {
            problems.push("agent.endword: must differ from agent.hotword".to_string());
        }
        if agent.history_steps == 0 {
            problems.push("agent.history_steps: must be at least 1".to_string());
        }
        if agent.emotions.is_empty() {
            problems.push("agent.emotions: at least one emotion is required".to_string());
        }
        if agent.tools.iter().any(|t| t.name.trim().is_empty()) {
            problems.push("agent.tools: every tool needs a name".to_string());
        }
    }

    fn check_llm(&self, problems: &mut Vec<String>) {
        let llm = &self.llm;

        if llm.model.trim().is_empty() {
            problems.push("llm.model: must not be empty".to_string());
        }
        if !(llm.endpoint.starts_with("http://") || llm.endpoint.starts_with("https://")) {
            problems.push(format!("llm.endpoint: expected an http(s) URL, got '{}'", llm.endpoint));
        }
        let has_key = llm.api_key.as_deref().is_some_and(|k| !k.trim().is_empty());
        if llm.provider == LlmProvider::OpenAi && !has_key && !llm.is_local_endpoint() {
            problems.push(
                "llm.api_key: an API key is required for remote OpenAI endpoints \
                 (use a dummy key for local OpenAI-compatible servers)"
                    .to_string(),
            );
        }
        if !(0.0..=2.0).contains(&llm.temperature) {
            problems.push(format!("llm.temperature: must be between 0.0 and 2.0, got {}", llm.temperature));
        }
        if !(llm.top_p > 0.0 && llm.top_p <= 1.0) {
            problems.push(format!("llm.top_p: must be in (0.0, 1.0], got {}", llm.top_p));
        }
        if llm.max_tokens == 0 {
            problems.push("llm.max_tokens: must be at least 1".to_string());
        }
        if llm.timeout_secs == 0 {
            problems.push("llm.timeout_secs: must be at least 1".to_string());
        }
    }

    fn check_io(&self, problems: &mut Vec<String>) {
        if self.input.mode == InputMode::Voice && self.input.transcript_path.is_none() {
            problems.push(
                "input.transcript_path: voice input needs the path the speech-to-text process writes to"
                    .to_string(),
            );
        }
        if self.input.timeout_secs == Some(0) {
            problems.push("input.timeout_secs: must be at least 1 when set".to_string());
        }
        if self.output.timeout_secs == 0 {
            problems.push("output.timeout_secs: must be at least 1".to_string());
        }
        if let Some(cmd) = &self.output.tts_command {
            if cmd.trim().is_empty() {
                problems.push("output.tts_command: must not be blank when set".to_string());
            }
        }
    }

    fn check_persistence(&self, problems: &mut Vec<String>) {
        if self.persistence.backend == PersistenceBackend::Sqlite
            && self.persistence.db_path.as_os_str().is_empty()
        {
            problems.push("persistence.db_path: required for the sqlite backend".to_string());
        }
        if self.persistence.timeout_secs == 0 {
            problems.push("persistence.timeout_secs: must be at least 1".to_string());
        }
    }
}

/// Load settings
///
/// Priority: env vars > explicit file > `config/{env}` > `config/default` > defaults.
pub fn load_settings(env: Option<&str>, file: Option<&Path>) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder();

    builder = builder.add_source(File::with_name("config/default").required(false));

    if let Some(env_name) = env {
        builder = builder.add_source(File::with_name(&format!("config/{}", env_name)).required(false));
    }

    if let Some(path) = file {
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }
        builder = builder.add_source(File::from(path));
    }

    builder = builder.add_source(
        Environment::with_prefix("VOICE_BUDDY")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;
    let settings: Settings = config.try_deserialize()?;

    settings.validate()?;

    tracing::debug!(
        provider = ?settings.llm.provider,
        model = %settings.llm.model,
        input = ?settings.input.mode,
        "Settings loaded"
    );

    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_settings_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.agent.history_steps, 200);
        assert_eq!(settings.persistence.backend, PersistenceBackend::Sqlite);
    }

    #[test]
    fn test_validation_lists_every_problem() {
        let mut settings = Settings::default();
        settings.agent.hotword = String::new();
        settings.agent.history_steps = 0;
        settings.llm.endpoint = "https://api.openai.com/v1".to_string();
        settings.input.mode = InputMode::Voice;

        let problems = settings.problems();
        assert_eq!(problems.len(), 4, "{:?}", problems);
        assert!(problems.iter().any(|p| p.starts_with("agent.hotword")));
        assert!(problems.iter().any(|p| p.starts_with("agent.history_steps")));
        assert!(problems.iter().any(|p| p.starts_with("llm.api_key")));
        assert!(problems.iter().any(|p| p.starts_with("input.transcript_path")));

        match settings.validate() {
            Err(ConfigError::Invalid(list)) => assert_eq!(list, problems),
            other => panic!("expected invalid config, got {:?}", other),
        }
    }

    #[test]
    fn test_same_hotword_and_endword_rejected() {
        let mut settings = Settings::default();
        settings.agent.endword = "Activate".to_string();
        let problems = settings.problems();
        assert!(problems.iter().any(|p| p.contains("must differ")));
    }

    #[test]
    fn test_remote_openai_with_key_is_valid() {
        let mut settings = Settings::default();
        settings.llm.endpoint = "https://api.openai.com/v1".to_string();
        settings.llm.api_key = Some("sk-test".to_string());
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_ollama_needs_no_key() {
        let mut settings = Settings::default();
        settings.llm.provider = LlmProvider::Ollama;
        settings.llm.endpoint = "http://gpu-box:11434".to_string();
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_load_from_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("buddy.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            "[agent]\nhotword = \"jarvis\"\nstart_inactive = true\n\n[llm]\nmax_parse_retries = 0\n\n[persistence]\nbackend = \"memory\""
        )
        .unwrap();

        let settings = load_settings(None, Some(&path)).unwrap();
        assert_eq!(settings.agent.hotword, "jarvis");
        assert!(settings.agent.start_inactive);
        assert_eq!(settings.agent.endword, "exit");
        assert_eq!(settings.llm.max_parse_retries, 0);
        assert_eq!(settings.persistence.backend, PersistenceBackend::Memory);
    }

    #[test]
    fn test_shipped_default_file() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../config/default.toml");
        let settings = load_settings(None, Some(&path)).unwrap();
        assert_eq!(settings.llm.provider, LlmProvider::OpenAi);
        assert_eq!(settings.agent.tools.len(), 1);
        assert_eq!(settings.input.mode, InputMode::Text);
    }

    #[test]
    fn test_missing_explicit_file() {
        let result = load_settings(None, Some(Path::new("/nonexistent/buddy.toml")));
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }
}
