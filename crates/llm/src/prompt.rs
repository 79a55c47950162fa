//! Prompt Building
//!
//! Builds the two prompts the buddy sends: the baseline prompt for a normal
//! turn and the repair prompt asking the model to reformat a reply that
//! could not be parsed.

use std::fmt;

use serde::{Deserialize, Serialize};

use voice_buddy_config::AgentConfig;
use voice_buddy_core::SchemaKey;

/// Chat message sent to the model
///
/// Prompts are always sent in the user role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }
}

/// Which template produced a prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptTemplate {
    Baseline,
    Repair,
}

impl PromptTemplate {
    /// Identifier persisted with each turn
    pub fn as_str(&self) -> &'static str {
        match self {
            PromptTemplate::Baseline => "baseline",
            PromptTemplate::Repair => "repair",
        }
    }
}

impl fmt::Display for PromptTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fully formatted prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub template: PromptTemplate,
    pub text: String,
}

impl Prompt {
    /// The prompt is sent as a single user message
    pub fn messages(&self) -> Vec<Message> {
        vec![Message::user(self.text.clone())]
    }
}

const PERSONA: &str = "The following is a conversation between a human and an AI friend. \
You are the AI friend and respond like a humorous and friendly human. \
The human input may have transcription errors and require correction.";

/// Prompt builder for the conversational buddy
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    emotions: Vec<String>,
    tool_names: Vec<String>,
    tool_descriptions: String,
}

impl PromptBuilder {
    pub fn new(config: &AgentConfig) -> Self {
        let tool_descriptions = config
            .tools
            .iter()
            .map(|tool| format!("{}: {}\n", tool.name, tool.description))
            .collect();

        Self {
            emotions: config.emotions.clone(),
            tool_names: config.tools.iter().map(|t| t.name.clone()).collect(),
            tool_descriptions,
        }
    }

    /// Tools as `name: description` lines
    pub fn tool_descriptions(&self) -> &str {
        &self.tool_descriptions
    }

    /// Output format block listing every schema key
    pub fn output_format(&self) -> String {
        let emotions = quoted_list(&self.emotions);
        let tools = quoted_list(&self.tool_names);

        let mut layout = String::from(
            "Format all of your output as json and strictly stick to the following variable names \
             and structure. If a variable doesn't apply or is unclear/unknown, set it as NA. \
             Avoid non-alphanumeric characters:\n{\n",
        );
        for key in SchemaKey::ALL {
            let line = match key {
                SchemaKey::HumanInput => {
                    "raw current human input, correct possible transcription errors if necessary".to_string()
                }
                SchemaKey::HumanEmotion => format!("human input emotion, must be one of {}", emotions),
                SchemaKey::ReactionEmotion => format!(
                    "expected emotion of another human in reaction to the human input, must be one of {}",
                    emotions
                ),
                SchemaKey::Intent => "intent of the human input".to_string(),
                SchemaKey::Action => "action for the AI".to_string(),
                SchemaKey::Tool => format!("required tool for the action (if any), must be one of {}", tools),
                SchemaKey::ToolInput => "input for the tool (if any)".to_string(),
                SchemaKey::Response => "verbal response to human input in tone of reaction_emotion, \
                    should not be longer than necessary. If using a tool, briefly explain what you will do"
                    .to_string(),
                SchemaKey::Entities => "entities or places mentioned by the human or ai".to_string(),
            };
            let sep = if key == SchemaKey::Entities { "." } else { "," };
            layout.push_str(&format!("\"{}\": {}{}\n", key, line, sep));
        }
        layout.push('}');
        layout
    }

    /// Prompt for a regular turn
    pub fn baseline(&self, transcript: &str, history: &str) -> Prompt {
        let text = format!(
            "{persona}\n\n\
             You have access to the following tools: {tools}\n\n\
             {layout}\n\
             History of ongoing conversation: \n{history}\n\n\
             Raw current human input: {transcript}\n\n",
            persona = PERSONA,
            tools = self.tool_descriptions,
            layout = self.output_format(),
            history = history,
            transcript = transcript,
        );

        Prompt {
            template: PromptTemplate::Baseline,
            text,
        }
    }

    /// Prompt asking the model to reformat a malformed reply
    pub fn repair(&self, malformed: &str) -> Prompt {
        let text = format!(
            "You have to fix an AI generated chatbot answer. \n\n\
             Here is a wrongly parametrized AI generated answer of a chatbot:\n\n\
             {malformed}\n\n\
             To be parsed correctly, the answer needs to be a python dictionary strictly in the \
             following format. Transform the above answer accordingly and remove any newlines or \
             bullet points within values but keep newlines between keys.\n\n\
             {layout}",
            malformed = malformed,
            layout = self.output_format(),
        );

        Prompt {
            template: PromptTemplate::Repair,
            text,
        }
    }
}

fn quoted_list(items: &[String]) -> String {
    let inner: Vec<String> = items.iter().map(|i| format!("'{}'", i)).collect();
    format!("[{}]", inner.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use voice_buddy_config::ToolConfig;

    fn builder() -> PromptBuilder {
        PromptBuilder::new(&AgentConfig::default())
    }

    #[test]
    fn test_output_format_lists_every_key() {
        let layout = builder().output_format();
        for key in SchemaKey::ALL {
            assert!(layout.contains(&format!("\"{}\":", key)), "missing {}", key);
        }
        assert!(layout.contains("'neutral', 'happiness'"));
        assert!(layout.contains("['Websearch']"));
        assert!(layout.ends_with('}'));
    }

    #[test]
    fn test_baseline_prompt() {
        let prompt = builder().baseline("how r u", "Human: hi\nAI: hello");
        assert_eq!(prompt.template, PromptTemplate::Baseline);
        assert!(prompt.text.starts_with("The following is a conversation"));
        assert!(prompt.text.contains("Websearch: Search the web"));
        assert!(prompt.text.contains("History of ongoing conversation: \nHuman: hi\nAI: hello\n"));
        assert!(prompt.text.contains("Raw current human input: how r u"));

        let messages = prompt.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content, prompt.text);
    }

    #[test]
    fn test_repair_prompt_embeds_reply() {
        let prompt = builder().repair("Sure! Here you go: hello");
        assert_eq!(prompt.template.as_str(), "repair");
        assert!(prompt.text.contains("Sure! Here you go: hello"));
        assert!(prompt.text.contains("\"response\":"));
        assert!(!prompt.text.contains("Raw current human input"));
    }

    #[test]
    fn test_custom_tools() {
        let config = AgentConfig {
            tools: vec![
                ToolConfig { name: "Weather".into(), description: "Current weather".into() },
                ToolConfig { name: "Timer".into(), description: "Set a timer".into() },
            ],
            ..Default::default()
        };
        let builder = PromptBuilder::new(&config);
        assert_eq!(builder.tool_descriptions(), "Weather: Current weather\nTimer: Set a timer\n");
        assert!(builder.output_format().contains("['Weather', 'Timer']"));
    }
}
