//! LLM integration for the voice buddy
//!
//! Features:
//! - Multiple backend support (Ollama, OpenAI-compatible)
//! - Prompt templates that ask for a fixed reply schema
//! - Tolerant parsing of free-form replies into `ParsedRecord`
//! - Bounded retry of unparseable replies with an optional confirmation gate

pub mod backend;
pub mod prompt;
pub mod parser;
pub mod invoker;

pub use backend::{
    LlmBackend, OllamaBackend, OpenAiBackend, BackendConfig, GenerationResult, FinishReason,
    create_backend,
};
pub use prompt::{PromptBuilder, Prompt, PromptTemplate, Message};
pub use parser::{SchemaParser, ParseError};
pub use invoker::{RetryingInvoker, InvokerConfig, Invocation, InvokeOutcome, InvokeError};

use thiserror::Error;

/// LLM errors
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("Generation error: {0}")]
    Generation(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Timeout")]
    Timeout,

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Timeout
        } else {
            LlmError::Network(err.to_string())
        }
    }
}

impl From<LlmError> for voice_buddy_core::Error {
    fn from(err: LlmError) -> Self {
        voice_buddy_core::Error::Llm(err.to_string())
    }
}
