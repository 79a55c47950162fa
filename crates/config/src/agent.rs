//! Agent and LLM configuration

use serde::{Deserialize, Serialize};

/// Turn-taking and prompt configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Phrase that switches passive listening to active mode
    #[serde(default = "default_hotword")]
    pub hotword: String,

    /// Phrase that ends active mode
    #[serde(default = "default_endword")]
    pub endword: String,

    /// Start passive and wait for the hotword
    #[serde(default)]
    pub start_inactive: bool,

    /// Ask the operator before sending each transcript to the model
    #[serde(default)]
    pub confirm_send: bool,

    /// Persist input heard while passive
    #[serde(default = "default_true")]
    pub log_chatter: bool,

    /// Number of previous steps included as conversation history
    #[serde(default = "default_history_steps")]
    pub history_steps: usize,

    /// Emotions the model may choose from
    #[serde(default = "default_emotions")]
    pub emotions: Vec<String>,

    /// Tools advertised to the model
    #[serde(default = "default_tools")]
    pub tools: Vec<ToolConfig>,
}

fn default_hotword() -> String {
    "activate".to_string()
}
fn default_endword() -> String {
    "exit".to_string()
}
fn default_true() -> bool {
    true
}
fn default_history_steps() -> usize {
    200
}
fn default_emotions() -> Vec<String> {
    ["neutral", "happiness", "fear", "anger", "surprise", "disgust", "sadness"]
        .iter()
        .map(|e| e.to_string())
        .collect()
}
fn default_tools() -> Vec<ToolConfig> {
    vec![ToolConfig {
        name: "Websearch".to_string(),
        description: "Search the web for up-to-date information".to_string(),
    }]
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            hotword: default_hotword(),
            endword: default_endword(),
            start_inactive: false,
            confirm_send: false,
            log_chatter: true,
            history_steps: default_history_steps(),
            emotions: default_emotions(),
            tools: default_tools(),
        }
    }
}

/// A tool the model may request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolConfig {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// LLM provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    /// Local Ollama server
    Ollama,
    /// OpenAI or any OpenAI-compatible server
    #[serde(rename = "openai", alias = "open_ai")]
    OpenAi,
}

/// What to send when a reply cannot be parsed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ParseRecovery {
    /// Send the original prompt again
    #[default]
    Regenerate,
    /// Ask the model to reformat its malformed reply
    Repair,
}

/// LLM configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_llm_provider")]
    pub provider: LlmProvider,

    /// Model name/ID
    #[serde(default = "default_llm_model")]
    pub model: String,

    /// API endpoint
    #[serde(default = "default_llm_endpoint")]
    pub endpoint: String,

    /// API key (a dummy value works for local OpenAI-compatible servers)
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_top_p")]
    pub top_p: f32,

    /// Stop sequences
    #[serde(default = "default_stop")]
    pub stop: Vec<String>,

    /// Timeout for a single generation
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,

    /// Retries for transient network failures inside a backend
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Extra generations allowed when a reply cannot be parsed
    #[serde(default = "default_max_parse_retries")]
    pub max_parse_retries: u32,

    #[serde(default)]
    pub parse_recovery: ParseRecovery,
}

fn default_llm_provider() -> LlmProvider {
    LlmProvider::OpenAi
}
fn default_llm_model() -> String {
    "gpt-3.5-turbo".to_string()
}
fn default_llm_endpoint() -> String {
    "http://localhost:5000/v1".to_string()
}
fn default_max_tokens() -> usize {
    300
}
fn default_temperature() -> f32 {
    0.7
}
fn default_top_p() -> f32 {
    0.9
}
fn default_stop() -> Vec<String> {
    vec!["<|im_end|>".to_string()]
}
fn default_llm_timeout() -> u64 {
    60
}
fn default_max_retries() -> u32 {
    2
}
fn default_max_parse_retries() -> u32 {
    3
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            model: default_llm_model(),
            endpoint: default_llm_endpoint(),
            api_key: None,
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            top_p: default_top_p(),
            stop: default_stop(),
            timeout_secs: default_llm_timeout(),
            max_retries: default_max_retries(),
            max_parse_retries: default_max_parse_retries(),
            parse_recovery: ParseRecovery::default(),
        }
    }
}

impl LlmConfig {
    /// Whether the endpoint points at this machine
    pub fn is_local_endpoint(&self) -> bool {
        let endpoint = self.endpoint.to_lowercase();
        ["http://localhost", "http://127.0.0.1", "http://0.0.0.0", "http://[::1]"]
            .iter()
            .any(|prefix| endpoint.starts_with(prefix))
    }

    /// Total generations allowed for one turn
    pub fn max_attempts(&self) -> u32 {
        self.max_parse_retries.saturating_add(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_defaults() {
        let config = AgentConfig::default();
        assert_eq!(config.hotword, "activate");
        assert_eq!(config.endword, "exit");
        assert_eq!(config.emotions.len(), 7);
        assert_eq!(config.tools[0].name, "Websearch");
    }

    #[test]
    fn test_local_endpoint_detection() {
        let mut config = LlmConfig::default();
        assert!(config.is_local_endpoint());

        config.endpoint = "https://api.openai.com/v1".to_string();
        assert!(!config.is_local_endpoint());
    }

    #[test]
    fn test_zero_parse_retries_means_one_attempt() {
        let config = LlmConfig {
            max_parse_retries: 0,
            ..Default::default()
        };
        assert_eq!(config.max_attempts(), 1);
    }
}
