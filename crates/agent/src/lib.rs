//! Conversation loop for the voice buddy
//!
//! Features:
//! - Hotword/endword driven listening modes
//! - Conversation history rebuilt from persisted turns
//! - Voice and text input with runtime switching
//! - Console or external-command speech output

pub mod agent;
pub mod history;
pub mod input;
pub mod output;
pub mod state;

pub use agent::{AgentEvent, BuddyConfig, StepOutcome, VoiceBuddy};
pub use history::{format_window, HistoryWindow};
pub use input::{ConsoleConfirm, InputRouter, StdinLines, StdinSource, TranscriptFileSource};
pub use output::{create_output, CommandSpeech, ConsoleSpeech};
pub use state::{next_conversation_id, ConversationStateMachine, InputDisposition, Session};

use thiserror::Error;

/// Agent errors
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Persistence error: {0}")]
    Persistence(#[from] voice_buddy_persistence::PersistenceError),

    #[error("Input error: {0}")]
    Input(String),

    #[error("Output error: {0}")]
    Output(String),

    #[error("Timeout: {0}")]
    Timeout(String),
}

impl From<voice_buddy_core::Error> for AgentError {
    fn from(err: voice_buddy_core::Error) -> Self {
        match err {
            voice_buddy_core::Error::Llm(e) => AgentError::Llm(e),
            voice_buddy_core::Error::Output(e) => AgentError::Output(e),
            voice_buddy_core::Error::Timeout(e) => AgentError::Timeout(e),
            other => AgentError::Input(other.to_string()),
        }
    }
}

impl From<AgentError> for voice_buddy_core::Error {
    fn from(err: AgentError) -> Self {
        match err {
            AgentError::Llm(e) => voice_buddy_core::Error::Llm(e),
            AgentError::Persistence(e) => e.into(),
            AgentError::Input(e) => voice_buddy_core::Error::Input(e),
            AgentError::Output(e) => voice_buddy_core::Error::Output(e),
            AgentError::Timeout(e) => voice_buddy_core::Error::Timeout(e),
        }
    }
}
