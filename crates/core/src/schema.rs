//! Reply schema
//!
//! The model is asked to answer with a fixed set of fields. `SchemaKey`
//! names them, `RecordDraft` collects values while a reply is scanned and
//! `ParsedRecord` is the finished, fully populated result.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Field names the model must produce in every reply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaKey {
    /// Human input with transcription errors corrected
    HumanInput,
    /// Emotion of the human input
    HumanEmotion,
    /// Emotion another human would show in reaction
    ReactionEmotion,
    /// Intent of the human input
    Intent,
    /// Action the AI should take
    Action,
    /// Tool required for the action
    Tool,
    /// Input for the tool
    ToolInput,
    /// Verbal response to the human
    Response,
    /// Entities or places mentioned
    Entities,
}

impl SchemaKey {
    /// All keys in prompt order
    pub const ALL: [SchemaKey; 9] = [
        SchemaKey::HumanInput,
        SchemaKey::HumanEmotion,
        SchemaKey::ReactionEmotion,
        SchemaKey::Intent,
        SchemaKey::Action,
        SchemaKey::Tool,
        SchemaKey::ToolInput,
        SchemaKey::Response,
        SchemaKey::Entities,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SchemaKey::HumanInput => "human_input",
            SchemaKey::HumanEmotion => "human_emotion",
            SchemaKey::ReactionEmotion => "reaction_emotion",
            SchemaKey::Intent => "intent",
            SchemaKey::Action => "action",
            SchemaKey::Tool => "tool",
            SchemaKey::ToolInput => "tool_input",
            SchemaKey::Response => "response",
            SchemaKey::Entities => "entities",
        }
    }

    /// Look up a key by its normalized name
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|k| k.as_str() == name)
    }
}

impl fmt::Display for SchemaKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Values collected while scanning one reply
///
/// Keys never set read as empty strings, except `response`, which stays
/// unset until a line explicitly provides it.
#[derive(Debug, Clone, Default)]
pub struct RecordDraft {
    values: HashMap<SchemaKey, String>,
}

impl RecordDraft {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a value; a repeated key overwrites the earlier one
    pub fn set(&mut self, key: SchemaKey, value: impl Into<String>) {
        self.values.insert(key, value.into());
    }

    pub fn get(&self, key: SchemaKey) -> Option<&str> {
        self.values.get(&key).map(String::as_str)
    }

    /// Whether the reply explicitly carried a response
    pub fn has_response(&self) -> bool {
        self.values.contains_key(&SchemaKey::Response)
    }

    /// Finish the draft, or `None` when no response was set
    pub fn finish(mut self) -> Option<ParsedRecord> {
        let response = self.values.remove(&SchemaKey::Response)?;
        let mut take = |key: SchemaKey| self.values.remove(&key).unwrap_or_default();

        Some(ParsedRecord {
            human_input: take(SchemaKey::HumanInput),
            human_emotion: take(SchemaKey::HumanEmotion),
            reaction_emotion: take(SchemaKey::ReactionEmotion),
            intent: take(SchemaKey::Intent),
            action: take(SchemaKey::Action),
            tool: take(SchemaKey::Tool),
            tool_input: take(SchemaKey::ToolInput),
            response,
            entities: take(SchemaKey::Entities),
        })
    }
}

/// Structured fields recovered from one model reply
///
/// Every field is present. An empty string means the model answered `NA`
/// or left the field out.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ParsedRecord {
    pub human_input: String,
    pub human_emotion: String,
    pub reaction_emotion: String,
    pub intent: String,
    pub action: String,
    pub tool: String,
    pub tool_input: String,
    pub response: String,
    pub entities: String,
}

impl ParsedRecord {
    /// Value for a schema key
    pub fn get(&self, key: SchemaKey) -> &str {
        match key {
            SchemaKey::HumanInput => &self.human_input,
            SchemaKey::HumanEmotion => &self.human_emotion,
            SchemaKey::ReactionEmotion => &self.reaction_emotion,
            SchemaKey::Intent => &self.intent,
            SchemaKey::Action => &self.action,
            SchemaKey::Tool => &self.tool,
            SchemaKey::ToolInput => &self.tool_input,
            SchemaKey::Response => &self.response,
            SchemaKey::Entities => &self.entities,
        }
    }

    /// Iterate over `(key, value)` pairs in prompt order
    pub fn iter(&self) -> impl Iterator<Item = (SchemaKey, &str)> {
        SchemaKey::ALL.iter().map(move |k| (*k, self.get(*k)))
    }

    /// Serialize back into the line format the model is asked to produce
    ///
    /// Empty values are written as `NA`, everything else is quoted, and the
    /// block is closed with `}`.
    pub fn to_reply_text(&self) -> String {
        let mut out = String::from("{\n");
        for (key, value) in self.iter() {
            if value.is_empty() {
                out.push_str(&format!("{}: NA\n", key));
            } else {
                out.push_str(&format!("{}: \"{}\"\n", key, value));
            }
        }
        out.push('}');
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_names_round_trip() {
        for key in SchemaKey::ALL {
            assert_eq!(SchemaKey::from_name(key.as_str()), Some(key));
        }
        assert_eq!(SchemaKey::from_name("mood"), None);
    }

    #[test]
    fn test_draft_without_response_does_not_finish() {
        let mut draft = RecordDraft::new();
        draft.set(SchemaKey::Intent, "greeting");
        assert!(!draft.has_response());
        assert!(draft.finish().is_none());
    }

    #[test]
    fn test_draft_defaults_to_empty() {
        let mut draft = RecordDraft::new();
        draft.set(SchemaKey::Response, "");
        let record = draft.finish().unwrap();
        assert_eq!(record, ParsedRecord::default());
    }

    #[test]
    fn test_last_value_wins() {
        let mut draft = RecordDraft::new();
        draft.set(SchemaKey::Response, "first");
        draft.set(SchemaKey::Response, "second");
        assert_eq!(draft.finish().unwrap().response, "second");
    }

    #[test]
    fn test_reply_text_format() {
        let record = ParsedRecord {
            response: "Hi".to_string(),
            intent: "greet".to_string(),
            ..Default::default()
        };
        let text = record.to_reply_text();
        assert!(text.contains("response: \"Hi\""));
        assert!(text.contains("tool: NA"));
        assert!(text.ends_with('}'));
    }
}
