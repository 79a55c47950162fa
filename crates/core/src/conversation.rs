//! Conversation types: listening modes, persisted turns and chatter

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ParsedRecord;

/// Listening mode of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ListeningMode {
    /// Passive: input is only logged, the model is not called
    #[default]
    Inactive,
    /// Engaged: every input runs a full turn
    Active,
}

impl ListeningMode {
    /// Name stored with each persisted row
    pub fn as_str(&self) -> &'static str {
        match self {
            ListeningMode::Inactive => "passive",
            ListeningMode::Active => "active",
        }
    }

    pub fn from_stored(value: &str) -> Option<Self> {
        match value {
            "passive" | "inactive" => Some(ListeningMode::Inactive),
            "active" => Some(ListeningMode::Active),
            _ => None,
        }
    }
}

impl std::fmt::Display for ListeningMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-turn context known before the model is called
#[derive(Debug, Clone)]
pub struct TurnHeader {
    pub conversation_id: i64,
    pub step: i64,
    pub timestamp: DateTime<Utc>,
    pub model: String,
    pub prompt_template: String,
    pub prompt_formatted: String,
    pub human_input_raw: String,
    pub history: String,
    pub listening_mode: ListeningMode,
}

/// One completed exchange, immutable once persisted
///
/// `(conversation_id, step)` is unique.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub conversation_id: i64,
    pub step: i64,
    pub timestamp: DateTime<Utc>,
    pub model: String,
    pub prompt_template: String,
    pub prompt_formatted: String,
    pub human_input_raw: String,
    pub human_input_corrected: String,
    pub llm_output_raw: String,
    pub response: String,
    pub human_emotion: String,
    pub reaction_emotion: String,
    pub intent: String,
    pub action: String,
    pub tool: String,
    pub tool_input: String,
    pub entities: String,
    /// History block that was sent with the prompt
    pub history: String,
    pub listening_mode: ListeningMode,
}

impl Turn {
    /// Combine the turn header with a parsed reply
    ///
    /// Categorical fields (emotions, tool, entities) are lowercased and
    /// stripped of double quotes; the response loses its double quotes.
    pub fn assemble(header: TurnHeader, record: &ParsedRecord, llm_output_raw: impl Into<String>) -> Self {
        Self {
            conversation_id: header.conversation_id,
            step: header.step,
            timestamp: header.timestamp,
            model: header.model,
            prompt_template: header.prompt_template,
            prompt_formatted: header.prompt_formatted,
            human_input_raw: header.human_input_raw,
            human_input_corrected: record.human_input.clone(),
            llm_output_raw: llm_output_raw.into(),
            response: record.response.replace('"', ""),
            human_emotion: categorical(&record.human_emotion),
            reaction_emotion: categorical(&record.reaction_emotion),
            intent: record.intent.clone(),
            action: record.action.clone(),
            tool: categorical(&record.tool),
            tool_input: record.tool_input.clone(),
            entities: categorical(&record.entities),
            history: header.history,
            listening_mode: header.listening_mode,
        }
    }
}

fn categorical(value: &str) -> String {
    value.to_lowercase().replace('"', "")
}

/// Input heard while passive, logged without a model call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chatter {
    pub timestamp: DateTime<Utc>,
    pub human_input_raw: String,
    pub listening_mode: ListeningMode,
}

impl Chatter {
    pub fn new(human_input_raw: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            human_input_raw: human_input_raw.into(),
            listening_mode: ListeningMode::Inactive,
        }
    }
}

/// The part of a persisted turn needed to rebuild history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exchange {
    pub step: i64,
    pub corrected_input: String,
    pub response: String,
}

impl Exchange {
    pub fn new(step: i64, corrected_input: impl Into<String>, response: impl Into<String>) -> Self {
        Self {
            step,
            corrected_input: corrected_input.into(),
            response: response.into(),
        }
    }
}

impl From<&Turn> for Exchange {
    fn from(turn: &Turn) -> Self {
        Self::new(turn.step, turn.human_input_corrected.clone(), turn.response.clone())
    }
}
